use folio_core::domain::report::{Report, Tone};
use folio_core::ingest::{download_link, AttachmentRef, AttachmentSlot};
use std::fmt::Write;

const MISSING: &str = "N/A";

pub fn summary_line(report: &Report) -> String {
    let m = report.metrics();
    format!(
        "[{}] {} ({}) - {} | {} | Target Price: {} | Upside: {} | Recommendation: {}",
        report.id,
        report.title,
        report.ticker,
        report.sector,
        report.date,
        m.target_price.as_deref().unwrap_or(MISSING),
        m.upside.as_deref().unwrap_or(MISSING),
        m.recommendation.map(|r| r.label()).unwrap_or(MISSING),
    )
}

pub fn detail(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", summary_line(report));
    if !report.description.is_empty() {
        let _ = writeln!(out, "  {}", report.description);
    }
    if let Some(tone) = report.recommendation_tone() {
        let _ = writeln!(out, "  Signal: {}", tone_word(tone));
    }

    for slot in AttachmentSlot::ALL {
        let value = match slot {
            AttachmentSlot::Pdf => &report.pdf_url,
            AttachmentSlot::Spreadsheet => &report.excel_url,
            AttachmentSlot::Logo => &report.logo_url,
        };
        let Some(link) = download_link(&report.title, slot, value) else {
            continue;
        };
        let location = match AttachmentRef::parse(value) {
            AttachmentRef::Embedded { media_type } => format!("embedded {media_type}, {} chars", value.len()),
            _ => link.href,
        };
        let _ = writeln!(out, "  {}: {} ({location})", slot.form_name(), link.download_name);
    }
    out
}

fn tone_word(tone: Tone) -> &'static str {
    match tone {
        Tone::Positive => "positive",
        Tone::Negative => "negative",
        Tone::Neutral => "neutral",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        serde_json::from_value(serde_json::json!({
            "id": 42,
            "title": "Acme Corp",
            "ticker": "ACME",
            "sector": "Tech",
            "date": "2026-03",
            "pdfUrl": "data:application/pdf;base64,JVBERg==",
            "excelUrl": "models/acme.xlsx",
            "valuation": {"metrics": {"recommendation": "Strong Buy"}}
        }))
        .unwrap()
    }

    #[test]
    fn absent_metrics_print_as_na() {
        let line = summary_line(&report());
        assert!(line.contains("Target Price: N/A"));
        assert!(line.contains("Recommendation: Strong Buy"));
    }

    #[test]
    fn detail_lists_both_attachment_forms() {
        let text = detail(&report());
        assert!(text.contains("Signal: positive"));
        assert!(text.contains("pdf: Acme Corp - Research Report.pdf (embedded application/pdf"));
        assert!(text.contains("excel: Acme Corp - Financial Model.xlsx (/models/acme.xlsx)"));
        assert!(!text.contains("logo:"));
    }
}
