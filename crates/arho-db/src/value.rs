//! Regulation and additional-information values.
//!
//! A value is a tagged union over the national `dataType` kinds. It is stored
//! verbatim as `jsonb` and reused on the wire, where the integer kinds are
//! coerced to whole numbers on output.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A typed attribute value attached to a plan regulation or to a piece of
/// additional information.
///
/// The serialized form matches the wire schema: the `dataType` tag selects
/// the variant and the remaining keys are the variant fields. A regulation
/// with no value stores SQL NULL and the wire document omits the `value` key
/// entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType")]
pub enum AttributeValue {
    LocalizedText {
        /// Language-keyed text map, e.g. `{"fin": "..."}`.
        text: JsonValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        syntax: Option<String>,
    },
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        syntax: Option<String>,
    },
    Numeric {
        number: f64,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    PositiveNumeric {
        number: f64,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Decimal {
        number: f64,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    PositiveDecimal {
        number: f64,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    SpotElevation {
        number: f64,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    NumericRange {
        #[serde(rename = "minimumValue", skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(rename = "maximumValue", skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    PositiveNumericRange {
        #[serde(rename = "minimumValue", skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(rename = "maximumValue", skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    DecimalRange {
        #[serde(rename = "minimumValue", skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(rename = "maximumValue", skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    PositiveDecimalRange {
        #[serde(rename = "minimumValue", skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(rename = "maximumValue", skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(rename = "unitOfMeasure", skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Code {
        /// Code URI within the referenced list, carried verbatim.
        code: String,
        #[serde(rename = "codeList", skip_serializing_if = "Option::is_none")]
        code_list: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<JsonValue>,
    },
}

impl AttributeValue {
    /// Whether this kind carries whole numbers on the wire. The national
    /// validator rejects fractional values for these kinds.
    pub fn is_integer_kind(&self) -> bool {
        matches!(
            self,
            Self::Numeric { .. }
                | Self::PositiveNumeric { .. }
                | Self::NumericRange { .. }
                | Self::PositiveNumericRange { .. }
                | Self::SpotElevation { .. }
        )
    }

    /// Serialize for the wire, truncating the number fields of the integer
    /// kinds to whole numbers.
    pub fn to_wire(&self) -> JsonValue {
        let mut value = serde_json::to_value(self).unwrap_or(JsonValue::Null);
        if self.is_integer_kind() {
            if let Some(obj) = value.as_object_mut() {
                for key in ["number", "minimumValue", "maximumValue"] {
                    if let Some(n) = obj.get(key).and_then(JsonValue::as_f64) {
                        obj.insert(key.to_owned(), JsonValue::from(n as i64));
                    }
                }
            }
        }
        value
    }
}
