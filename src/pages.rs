// Navigation shell - the dashboard pages and their placeholders

use serde::Serialize;

pub const SOURCE_NOTE: &str =
    "Trailing 24 months for homes built since 2020. Source: Parcl Labs API.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    HomeSales,
    Permits,
    Demographics,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::HomeSales, Page::Permits, Page::Demographics];

    pub fn title(&self) -> &'static str {
        match self {
            Page::HomeSales => "Home Sales",
            Page::Permits => "Building Permits",
            Page::Demographics => "Demographics",
        }
    }

    /// URL path segment
    pub fn slug(&self) -> &'static str {
        match self {
            Page::HomeSales => "home-sales",
            Page::Permits => "permits",
            Page::Demographics => "demographics",
        }
    }

    /// Material Symbols icon name
    pub fn icon(&self) -> &'static str {
        match self {
            Page::HomeSales => "real_estate_agent",
            Page::Permits => "construction",
            Page::Demographics => "group",
        }
    }

    /// Only the sales view has data behind it so far
    pub fn is_available(&self) -> bool {
        matches!(self, Page::HomeSales)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NavEntry {
    pub page: Page,
    pub title: &'static str,
    pub path: String,
    pub icon: &'static str,
    pub available: bool,
}

pub fn navigation() -> Vec<NavEntry> {
    Page::ALL
        .into_iter()
        .map(|page| NavEntry {
            page,
            title: page.title(),
            path: format!("/{}", page.slug()),
            icon: page.icon(),
            available: page.is_available(),
        })
        .collect()
}
