use crate::domain::contract::ReportDraft;
use crate::domain::report::Recommendation;
use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarField {
    Title,
    Ticker,
    Sector,
    Description,
    Date,
}

/// Fields living under `valuation.metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    TargetPrice,
    Upside,
    Recommendation,
}

/// One form edit. Each kind is applied by its own function.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Scalar(ScalarField, String),
    /// Whole editor output; replaces, never merges.
    RichText(String),
    Metric(MetricField, String),
}

impl FieldUpdate {
    /// Maps a form control name to a typed update. Metric fields are accepted both flat
    /// (`targetPrice`) and by their nested path (`valuation.metrics.targetPrice`).
    pub fn from_form(name: &str, value: impl Into<String>) -> anyhow::Result<Self> {
        let value = value.into();
        let update = match name {
            "title" => FieldUpdate::Scalar(ScalarField::Title, value),
            "ticker" => FieldUpdate::Scalar(ScalarField::Ticker, value),
            "sector" => FieldUpdate::Scalar(ScalarField::Sector, value),
            "description" => FieldUpdate::Scalar(ScalarField::Description, value),
            "date" => FieldUpdate::Scalar(ScalarField::Date, value),
            "methodology" => FieldUpdate::RichText(value),
            other => {
                let leaf = match other.split('.').collect::<Vec<_>>().as_slice() {
                    [leaf] => *leaf,
                    ["valuation", "metrics", leaf] => *leaf,
                    _ => bail!("unknown form field {other:?}"),
                };
                let field = match leaf {
                    "targetPrice" => MetricField::TargetPrice,
                    "upside" => MetricField::Upside,
                    "recommendation" => MetricField::Recommendation,
                    _ => bail!("unknown form field {other:?}"),
                };
                FieldUpdate::Metric(field, value)
            }
        };
        Ok(update)
    }

    pub fn apply(self, draft: &mut ReportDraft) -> anyhow::Result<()> {
        match self {
            FieldUpdate::Scalar(field, value) => {
                apply_scalar(draft, field, value);
                Ok(())
            }
            FieldUpdate::RichText(html) => {
                apply_rich_text(draft, html);
                Ok(())
            }
            FieldUpdate::Metric(field, value) => apply_metric(draft, field, value),
        }
    }
}

fn apply_scalar(draft: &mut ReportDraft, field: ScalarField, value: String) {
    let target = match field {
        ScalarField::Title => &mut draft.title,
        ScalarField::Ticker => &mut draft.ticker,
        ScalarField::Sector => &mut draft.sector,
        ScalarField::Description => &mut draft.description,
        ScalarField::Date => &mut draft.date,
    };
    *target = value;
}

fn apply_rich_text(draft: &mut ReportDraft, html: String) {
    draft.methodology = html;
}

fn apply_metric(draft: &mut ReportDraft, field: MetricField, value: String) -> anyhow::Result<()> {
    let metrics = &mut draft.metrics;
    match field {
        MetricField::TargetPrice => metrics.target_price = value,
        MetricField::Upside => metrics.upside = value,
        MetricField::Recommendation => {
            metrics.recommendation = if value.trim().is_empty() {
                None
            } else {
                Some(value.parse::<Recommendation>()?)
            };
        }
    }
    Ok(())
}
