use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub ticker: String,
    pub sector: String,
    #[serde(default)]
    pub description: String,
    /// Year-month (`YYYY-MM`).
    #[serde(default)]
    pub date: String,
    /// Executive summary as editor-emitted HTML.
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default)]
    pub excel_url: String,
    #[serde(default)]
    pub logo_url: String,
    #[serde(default)]
    pub valuation: Valuation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    #[serde(default)]
    pub metrics: ValuationMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationMetrics {
    #[serde(default, with = "blank_as_none")]
    pub target_price: Option<String>,
    #[serde(default, with = "blank_as_none")]
    pub upside: Option<String>,
    #[serde(default, with = "blank_as_none")]
    pub recommendation: Option<Recommendation>,
}

impl Report {
    pub fn metrics(&self) -> &ValuationMetrics {
        &self.valuation.metrics
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.valuation.metrics.recommendation
    }

    pub fn recommendation_tone(&self) -> Option<Tone> {
        self.recommendation().map(|r| r.tone())
    }

    pub fn upside_direction(&self) -> Option<Tone> {
        self.valuation.metrics.upside.as_deref().map(upside_tone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub const ALL: [Recommendation; 5] = [
        Recommendation::StrongBuy,
        Recommendation::Buy,
        Recommendation::Hold,
        Recommendation::Sell,
        Recommendation::StrongSell,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Hold => "Hold",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }

    pub fn tone(self) -> Tone {
        label_tone(self.label())
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Recommendation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Recommendation::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown recommendation {wanted:?} (expected one of Strong Buy, Buy, Hold, Sell, Strong Sell)"
                )
            })
    }
}

impl Serialize for Recommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Recommendation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Indicator coloring: success, error or warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

/// Any label mentioning "buy" is positive, then "sell" is negative.
pub fn label_tone(label: &str) -> Tone {
    let lower = label.to_ascii_lowercase();
    if lower.contains("buy") {
        Tone::Positive
    } else if lower.contains("sell") {
        Tone::Negative
    } else {
        Tone::Neutral
    }
}

pub fn upside_tone(upside: &str) -> Tone {
    if upside.contains('-') {
        Tone::Negative
    } else {
        Tone::Positive
    }
}

/// Stored records write absent metrics as `""`; read them back as `None`.
mod blank_as_none {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
