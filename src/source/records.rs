//! Inbound wire records.

use serde::{Deserialize, Serialize};

use super::feed::InboundRecord;

/// Order to run one named check against one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOrderData {
    pub object_type: String,
    pub check_name: String,
    pub object_identifier: String,
}

impl CheckOrderData {
    pub fn new(
        object_type: impl Into<String>,
        check_name: impl Into<String>,
        object_identifier: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            check_name: check_name.into(),
            object_identifier: object_identifier.into(),
        }
    }
}

impl InboundRecord for CheckOrderData {
    fn object_type(&self) -> &str {
        &self.object_type
    }

    fn object_identifier(&self) -> &str {
        &self.object_identifier
    }

    fn operation_name(&self) -> &str {
        &self.check_name
    }
}

/// Change notification for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEventMessage {
    pub object_type: String,
    pub object_identifier: String,
    pub event_name: String,
    #[serde(default)]
    pub data: String,
}

impl ChangeEventMessage {
    pub fn new(
        object_type: impl Into<String>,
        object_identifier: impl Into<String>,
        event_name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_identifier: object_identifier.into(),
            event_name: event_name.into(),
            data: data.into(),
        }
    }

    /// Change data with `,` replaced by `;`
    pub fn data(&self) -> String {
        self.data.replace(',', ";")
    }
}

impl InboundRecord for ChangeEventMessage {
    fn object_type(&self) -> &str {
        &self.object_type
    }

    fn object_identifier(&self) -> &str {
        &self.object_identifier
    }

    fn operation_name(&self) -> &str {
        &self.event_name
    }
}
