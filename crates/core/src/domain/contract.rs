use crate::domain::report::{Recommendation, Report, Valuation, ValuationMetrics};
use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The admin form's field set. Everything is free text except the recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
    pub title: String,
    pub ticker: String,
    pub sector: String,
    pub description: String,
    pub date: String,
    pub methodology: String,
    pub metrics: DraftMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetrics {
    pub target_price: String,
    pub upside: String,
    pub recommendation: Option<Recommendation>,
}

/// Encoded attachment strings for one submission; `None` means no new file for that slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub pdf: Option<String>,
    pub excel: Option<String>,
    pub logo: Option<String>,
}

impl Attachments {
    pub fn is_empty(&self) -> bool {
        self.pdf.is_none() && self.excel.is_none() && self.logo.is_none()
    }
}

impl ReportDraft {
    /// Form fields for editing an existing record.
    pub fn from_report(report: &Report) -> Self {
        let m = report.metrics();
        Self {
            title: report.title.clone(),
            ticker: report.ticker.clone(),
            sector: report.sector.clone(),
            description: report.description.clone(),
            date: report.date.clone(),
            methodology: report.methodology.clone(),
            metrics: DraftMetrics {
                target_price: m.target_price.clone().unwrap_or_default(),
                upside: m.upside.clone().unwrap_or_default(),
                recommendation: m.recommendation,
            },
        }
    }

    /// Presence checks mirroring the form's required controls.
    pub fn check_required(&self) -> anyhow::Result<()> {
        ensure!(!self.title.trim().is_empty(), "title is required");
        ensure!(!self.ticker.trim().is_empty(), "ticker is required");
        ensure!(!self.sector.trim().is_empty(), "sector is required");
        Ok(())
    }

    /// Builds a fresh record. Blank dates default to the current year-month.
    pub fn into_new_report(self, id: i64, attachments: Attachments, now: DateTime<Utc>) -> Report {
        let date = non_blank(&self.date).unwrap_or_else(|| current_year_month(now));
        self.into_report(
            id,
            date,
            attachments.pdf.unwrap_or_default(),
            attachments.excel.unwrap_or_default(),
            attachments.logo.unwrap_or_default(),
        )
    }

    /// Builds the replacement for `previous`; slots without a new attachment keep the stored value.
    pub fn into_updated_report(self, previous: &Report, attachments: Attachments) -> Report {
        let date = non_blank(&self.date).unwrap_or_else(|| previous.date.clone());
        self.into_report(
            previous.id,
            date,
            attachments.pdf.unwrap_or_else(|| previous.pdf_url.clone()),
            attachments.excel.unwrap_or_else(|| previous.excel_url.clone()),
            attachments.logo.unwrap_or_else(|| previous.logo_url.clone()),
        )
    }

    fn into_report(
        self,
        id: i64,
        date: String,
        pdf_url: String,
        excel_url: String,
        logo_url: String,
    ) -> Report {
        Report {
            id,
            ticker: normalize_ticker(&self.ticker),
            title: self.title,
            sector: self.sector,
            description: self.description,
            date,
            methodology: self.methodology,
            pdf_url,
            excel_url,
            logo_url,
            valuation: Valuation {
                metrics: ValuationMetrics {
                    target_price: non_blank(&self.metrics.target_price),
                    upside: non_blank(&self.metrics.upside),
                    recommendation: self.metrics.recommendation,
                },
            },
        }
    }
}

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn current_year_month(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| s.to_string())
}
