use crate::domain::report::Report;
use serde::Serialize;
use std::collections::HashSet;

pub const ALL_SECTORS: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectorFilter {
    All,
    Sector(String),
}

impl SectorFilter {
    /// `None`, blank and `"all"` select every sector.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => SectorFilter::All,
            Some(s) if s == ALL_SECTORS => SectorFilter::All,
            Some(s) => SectorFilter::Sector(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SectorFilter::All => ALL_SECTORS,
            SectorFilter::Sector(s) => s,
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        match self {
            SectorFilter::All => true,
            SectorFilter::Sector(s) => report.sector == *s,
        }
    }
}

pub fn filter_by_sector(reports: Vec<Report>, filter: &SectorFilter) -> Vec<Report> {
    match filter {
        SectorFilter::All => reports,
        _ => reports.into_iter().filter(|r| filter.matches(r)).collect(),
    }
}

/// Distinct sectors in first-seen order.
pub fn sectors(reports: &[Report]) -> Vec<String> {
    let mut seen = HashSet::new();
    reports
        .iter()
        .filter(|r| seen.insert(r.sector.as_str()))
        .map(|r| r.sector.clone())
        .collect()
}

/// The sector chips of the research page: the pseudo-sector first, then every sector present.
#[derive(Debug, Clone, Serialize)]
pub struct SectorChips {
    pub options: Vec<String>,
    pub selected: String,
}

pub fn sector_chips(reports: &[Report], filter: &SectorFilter) -> SectorChips {
    let mut options = vec![ALL_SECTORS.to_string()];
    options.extend(sectors(reports));
    SectorChips {
        options,
        selected: filter.as_str().to_string(),
    }
}
