//! Wire form of a statistic.
//!
//! The description travels under the key `descriprion`; existing producers and
//! consumers of the statistics topic use that spelling.

use serde::{Deserialize, Serialize};

use super::Statistic;
use crate::error::ToolkitResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticDto {
    pub name: String,
    pub value: String,
    #[serde(rename = "descriprion")]
    pub description: String,
}

impl StatisticDto {
    pub fn to_json(&self) -> ToolkitResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(payload: &[u8]) -> ToolkitResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl From<&Statistic> for StatisticDto {
    fn from(statistic: &Statistic) -> Self {
        Self {
            name: statistic.name().to_string(),
            value: statistic.value().to_string(),
            description: statistic.description().to_string(),
        }
    }
}

impl From<StatisticDto> for Statistic {
    fn from(dto: StatisticDto) -> Self {
        Statistic::new(dto.name, dto.value, dto.description)
    }
}
