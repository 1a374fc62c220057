use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bridge::{decode_value, InstrumentationBridge};
use crate::error::BridgeError;
use crate::scripts;
use crate::target::Script;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Local,
    Session,
}

impl StorageArea {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageArea::Local => "local",
            StorageArea::Session => "session",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageArea {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" | "localstorage" => Ok(StorageArea::Local),
            "session" | "sessionstorage" => Ok(StorageArea::Session),
            other => Err(format!("unknown storage area '{other}'")),
        }
    }
}

pub type StorageItems = BTreeMap<String, String>;

impl InstrumentationBridge {
    pub async fn storage_items(&self, area: StorageArea) -> Result<StorageItems, BridgeError> {
        self.observed("storage_items", async {
            let value = self
                .evaluate(Script::call(scripts::STORAGE_ITEMS, vec![json!(area.as_str())]))
                .await?;
            decode_value(value)
        })
        .await
    }

    pub async fn set_storage_item(
        &self,
        area: StorageArea,
        key: &str,
        value: &str,
    ) -> Result<(), BridgeError> {
        self.observed("storage_set", async {
            self.evaluate(Script::call(
                scripts::STORAGE_SET,
                vec![json!(area.as_str()), json!(key), json!(value)],
            ))
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn remove_storage_item(&self, area: StorageArea, key: &str) -> Result<(), BridgeError> {
        self.observed("storage_remove", async {
            self.evaluate(Script::call(
                scripts::STORAGE_REMOVE,
                vec![json!(area.as_str()), json!(key)],
            ))
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn clear_storage(&self, area: StorageArea) -> Result<(), BridgeError> {
        self.observed("storage_clear", async {
            self.evaluate(Script::call(scripts::STORAGE_CLEAR, vec![json!(area.as_str())]))
                .await?;
            Ok(())
        })
        .await
    }
}
