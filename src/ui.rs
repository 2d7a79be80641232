use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use home_sales_map::aggregate::{aggregate_by_block_group, totals, AggregateTotals};
use home_sales_map::choropleth::{ColorScale, Rgb};
use home_sales_map::pages::SOURCE_NOTE;
use home_sales_map::{BlockGroupAggregate, Dataset, MapMetric, SaleRecord, SalesFilter};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    BlockGroups,
    RawSales,
    Help,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::BlockGroups => Page::RawSales,
            Page::RawSales => Page::Help,
            Page::Help => Page::BlockGroups,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::BlockGroups => Page::Help,
            Page::RawSales => Page::BlockGroups,
            Page::Help => Page::RawSales,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::BlockGroups => "Aggregates",
            Page::RawSales => "Raw Sales",
            Page::Help => "Help",
        }
    }
}

pub struct App {
    pub dataset: Dataset,
    pub filter: SalesFilter,
    pub metric: MapMetric,
    pub filtered_sales: Vec<SaleRecord>,
    pub aggregates: Vec<BlockGroupAggregate>,
    pub totals: AggregateTotals,
    pub state: TableState,
    pub sales_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(dataset: Dataset) -> Self {
        let mut app = Self {
            dataset,
            filter: SalesFilter::default(),
            metric: MapMetric::default(),
            filtered_sales: Vec::new(),
            aggregates: Vec::new(),
            totals: AggregateTotals::default(),
            state: TableState::default(),
            sales_state: TableState::default(),
            current_page: Page::BlockGroups,
            show_detail: false,
        };
        app.recompute();
        app
    }

    /// Re-run filter + aggregate after any control change
    pub fn recompute(&mut self) {
        self.filtered_sales = self.dataset.filtered_sales(&self.filter);
        self.aggregates = aggregate_by_block_group(&self.filtered_sales, &self.dataset.counties);
        self.totals = totals(&self.filtered_sales, &self.aggregates);

        self.state
            .select(if self.aggregates.is_empty() { None } else { Some(0) });
        self.sales_state
            .select(if self.filtered_sales.is_empty() { None } else { Some(0) });
    }

    pub fn adjust(&mut self, change: impl FnOnce(&mut SalesFilter)) {
        let before = self.filter.clone();
        change(&mut self.filter);
        if self.filter != before {
            self.recompute();
        }
    }

    pub fn cycle_metric(&mut self) {
        self.metric = self.metric.next();
    }

    pub fn reset(&mut self) {
        self.filter = SalesFilter::default();
        self.metric = MapMetric::default();
        self.recompute();
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_block_group(&self) -> Option<&BlockGroupAggregate> {
        self.state.selected().and_then(|i| self.aggregates.get(i))
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn active(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::RawSales => (&mut self.sales_state, self.filtered_sales.len()),
            _ => (&mut self.state, self.aggregates.len()),
        }
    }

    pub fn next(&mut self) {
        self.move_by(1, true);
    }

    pub fn previous(&mut self) {
        self.move_by(-1, true);
    }

    pub fn page_down(&mut self) {
        self.move_by(20, false);
    }

    pub fn page_up(&mut self) {
        self.move_by(-20, false);
    }

    fn move_by(&mut self, delta: isize, wrap: bool) {
        let (state, len) = self.active();
        if len == 0 {
            return;
        }
        let current = state.selected().unwrap_or(0) as isize;
        let last = len as isize - 1;
        let target = current + delta;
        let i = if wrap {
            if target > last {
                0
            } else if target < 0 {
                last
            } else {
                target
            }
        } else {
            target.clamp(0, last)
        };
        state.select(Some(i as usize));
    }

    /// Min/max of the current metric across block groups
    pub fn metric_range(&self) -> Option<(f64, f64)> {
        self.aggregates
            .iter()
            .filter_map(|a| self.metric.value(a))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Char('r') => app.reset(),
                KeyCode::Char('m') => app.cycle_metric(),
                KeyCode::Char('1') => app.adjust(|f| f.step_sqft_min(-1)),
                KeyCode::Char('2') => app.adjust(|f| f.step_sqft_min(1)),
                KeyCode::Char('3') => app.adjust(|f| f.step_sqft_max(-1)),
                KeyCode::Char('4') => app.adjust(|f| f.step_sqft_max(1)),
                KeyCode::Char('5') => app.adjust(|f| f.step_bedrooms(-1)),
                KeyCode::Char('6') => app.adjust(|f| f.step_bedrooms(1)),
                KeyCode::Char('7') => app.adjust(|f| f.step_bathrooms(-1)),
                KeyCode::Char('8') => app.adjust(|f| f.step_bathrooms(1)),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Length(3), // Filter controls
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_controls(f, chunks[1], app);

    if app.show_detail && app.current_page == Page::BlockGroups {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[2]);

        render_block_groups(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::BlockGroups => render_block_groups(f, chunks[2], app),
            Page::RawSales => render_sales(f, chunks[2], app),
            Page::Help => render_help(f, chunks[2]),
        }
    }

    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::BlockGroups, Page::RawSales, Page::Help].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Loaded: {}", app.dataset.info.sales_rows),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Kept: {}", app.filtered_sales.len()),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("BGs: {}", app.totals.block_groups),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Home Sales "),
    );

    f.render_widget(header, area);
}

fn render_controls(f: &mut Frame, area: Rect, app: &App) {
    let key = Style::default().fg(Color::Yellow);
    let value = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

    let spans = vec![
        Span::raw(" Sq ft "),
        Span::styled("1/2", key),
        Span::raw(" "),
        Span::styled(app.filter.sqft_min.to_string(), value),
        Span::raw(" - "),
        Span::styled(app.filter.sqft_max.to_string(), value),
        Span::raw(" "),
        Span::styled("3/4", key),
        Span::raw("  │  Beds ≥ "),
        Span::styled(app.filter.min_bedrooms.to_string(), value),
        Span::raw(" "),
        Span::styled("5/6", key),
        Span::raw("  │  Baths ≥ "),
        Span::styled(format!("{:.1}", app.filter.min_bathrooms), value),
        Span::raw(" "),
        Span::styled("7/8", key),
        Span::raw("  │  Map: "),
        Span::styled(app.metric.label(), value),
        Span::raw(" "),
        Span::styled("m", key),
    ];

    let controls = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Filter map by "),
    );

    f.render_widget(controls, area);
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{:.*}", decimals, v))
        .unwrap_or_else(|| "-".to_string())
}

fn render_block_groups(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["BG_ID", "County", "Sales", "Median Price", "Price/SF", "Median SF"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let scale = ColorScale::blues();
    let range = app.metric_range();
    let metric = app.metric;

    let rows = app.aggregates.iter().map(|bg| {
        // The selected metric's cell carries its choropleth color
        let swatch = match (metric.value(bg), range) {
            (Some(v), Some((lo, hi))) => Style::default()
                .bg(to_color(scale.color_for(v, lo, hi)))
                .fg(Color::Black),
            _ => Style::default(),
        };
        let style_for = |m: MapMetric| if m == metric { swatch } else { Style::default() };

        let cells = vec![
            Cell::from(bg.bg_id.clone()),
            Cell::from(bg.county_name.clone().unwrap_or_else(|| "-".to_string())),
            Cell::from(bg.total_sales.to_string()).style(style_for(MapMetric::TotalSales)),
            Cell::from(fmt_opt(bg.median_price, 0)),
            Cell::from(fmt_opt(bg.median_price_sf, 2)).style(style_for(MapMetric::MedianPriceSf)),
            Cell::from(fmt_opt(bg.median_sf, 0)).style(style_for(MapMetric::MedianSquareFootage)),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Block Groups - {} ", app.metric.label())),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_sales(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Address", "Price", "Price/SF", "Sq Ft", "Bd", "Ba", "BG_ID"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered_sales.iter().map(|sale| {
        Row::new(vec![
            Cell::from(truncate(&sale.address, 30)),
            Cell::from(format!("{:.0}", sale.price)),
            Cell::from(format!("{:.2}", sale.price_sf)),
            Cell::from(sale.square_footage.to_string()),
            Cell::from(sale.bedrooms.to_string()),
            Cell::from(format!("{:.1}", sale.bathrooms)),
            Cell::from(sale.bg_id.clone()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Filtered Sales "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.sales_state);
}

fn render_help(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Controls",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![Span::raw("  "), key("1 / 2"), Span::raw("   minimum square footage -/+ 500")]),
        Line::from(vec![Span::raw("  "), key("3 / 4"), Span::raw("   maximum square footage -/+ 500")]),
        Line::from(vec![Span::raw("  "), key("5 / 6"), Span::raw("   minimum bedrooms -/+ 1")]),
        Line::from(vec![Span::raw("  "), key("7 / 8"), Span::raw("   minimum bathrooms -/+ 0.5")]),
        Line::from(vec![Span::raw("  "), key("m"), Span::raw("       cycle map aggregation")]),
        Line::from(vec![Span::raw("  "), key("r"), Span::raw("       reset filters")]),
        Line::from(vec![Span::raw("  "), key("Enter"), Span::raw("   block group details")]),
        Line::from(""),
        Line::from(Span::styled(format!("  {}", SOURCE_NOTE), Style::default().fg(Color::DarkGray))),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Controls "),
    );

    f.render_widget(paragraph, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let bg = match app.selected_block_group() {
        Some(bg) => bg,
        None => {
            let no_selection = Paragraph::new("No block group selected").block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Block Group "),
            );
            f.render_widget(no_selection, area);
            return;
        }
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let sales_here = app
        .filtered_sales
        .iter()
        .filter(|s| s.bg_id == bg.bg_id)
        .count();

    let content = vec![
        Line::from(""),
        Line::from(vec![Span::styled("  GEOID: ", label), Span::raw(bg.bg_id.clone())]),
        Line::from(vec![
            Span::styled("  County: ", label),
            Span::raw(bg.county_name.clone().unwrap_or_else(|| "unknown".to_string())),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("  Total sales: ", label), Span::raw(bg.total_sales.to_string())]),
        Line::from(vec![Span::styled("  Rows kept: ", label), Span::raw(sales_here.to_string())]),
        Line::from(vec![Span::styled("  Median price: ", label), Span::raw(fmt_opt(bg.median_price, 0))]),
        Line::from(vec![Span::styled("  Median price/SF: ", label), Span::raw(fmt_opt(bg.median_price_sf, 2))]),
        Line::from(vec![Span::styled("  Median home size: ", label), Span::raw(fmt_opt(bg.median_sf, 0))]),
    ];

    let detail_panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Block Group "),
    );

    f.render_widget(detail_panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &mut App) {
    let (state, total) = app.active();
    let selected = state.selected().map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, total), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len - 3).collect();
        format!("{}...", cut)
    }
}
