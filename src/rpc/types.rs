use bigdecimal::BigDecimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

pub const CATEGORY_RECEIVE: &str = "receive";

/// One entry of `listtransactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListTransaction {
    #[serde(default)]
    pub address: Option<String>,
    pub category: String,
    #[serde(deserialize_with = "amount_from_json")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub confirmations: i64,
    pub txid: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
}

impl ListTransaction {
    pub fn is_receive(&self) -> bool {
        self.category == CATEGORY_RECEIVE
    }
}

/// Nodes report amounts as JSON numbers; go through their textual form so
/// no binary floating point rounding leaks into balances.
fn amount_from_json<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s,
        other => {
            return Err(de::Error::custom(format!(
                "expected a numeric amount, got {}",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim()).map_err(de::Error::custom)
}
