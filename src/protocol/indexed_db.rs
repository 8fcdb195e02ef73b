//! IndexedDB domain bindings
//!
//! <https://chromedevtools.github.io/devtools-protocol/tot/IndexedDB/> (experimental)

use crate::cdp::command::{call, call_unit, call_without_params};
use crate::cdp::traits::CdpConnection;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Database with an array of object stores
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseWithObjectStores {
    pub name: String,
    /// Usually an integer, but the protocol declares a number
    pub version: f64,
    pub object_stores: Vec<ObjectStore>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStore {
    pub name: String,
    pub key_path: KeyPath,
    pub auto_increment: bool,
    pub indexes: Vec<ObjectStoreIndex>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreIndex {
    pub name: String,
    pub key_path: KeyPath,
    pub unique: bool,
    pub multi_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPath {
    /// "null", "string" or "array"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<Vec<String>>,
}

/// A key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// "number", "string", "date" or "array"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<Vec<Key>>,
}

impl Key {
    pub fn number(n: f64) -> Self {
        Self {
            kind: "number".to_string(),
            number: Some(n),
            string: None,
            date: None,
            array: None,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            number: None,
            string: Some(s.into()),
            date: None,
            array: None,
        }
    }
}

/// Key range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Key>,
    pub lower_open: bool,
    pub upper_open: bool,
}

/// Data entry; key, primary key and value are Runtime remote objects
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntry {
    pub key: Value,
    pub primary_key: Value,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearObjectStoreParams {
    pub security_origin: String,
    pub database_name: String,
    pub object_store_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDatabaseParams {
    pub security_origin: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteObjectStoreEntriesParams {
    pub security_origin: String,
    pub database_name: String,
    pub object_store_name: String,
    pub key_range: KeyRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDataParams {
    pub security_origin: String,
    pub database_name: String,
    pub object_store_name: String,
    /// Empty string requests data from the object store itself
    pub index_name: String,
    pub skip_count: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_range: Option<KeyRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDataResult {
    pub object_store_data_entries: Vec<DataEntry>,
    /// More entries exist past this page
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDatabaseParams {
    pub security_origin: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDatabaseResult {
    pub database_with_object_stores: DatabaseWithObjectStores,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDatabaseNamesParams {
    pub security_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDatabaseNamesResult {
    pub database_names: Vec<String>,
}

/// Clears all entries from an object store
pub async fn clear_object_store<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &ClearObjectStoreParams,
) -> Result<()> {
    call_unit(conn, "IndexedDB.clearObjectStore", params).await
}

pub async fn delete_database<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &DeleteDatabaseParams,
) -> Result<()> {
    call_unit(conn, "IndexedDB.deleteDatabase", params).await
}

/// Deletes a range of entries from an object store
pub async fn delete_object_store_entries<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &DeleteObjectStoreEntriesParams,
) -> Result<()> {
    call_unit(conn, "IndexedDB.deleteObjectStoreEntries", params).await
}

/// Enables events from backend
pub async fn enable<C: CdpConnection + ?Sized>(conn: &C) -> Result<()> {
    call_without_params(conn, "IndexedDB.enable").await
}

/// Disables events from backend
pub async fn disable<C: CdpConnection + ?Sized>(conn: &C) -> Result<()> {
    call_without_params(conn, "IndexedDB.disable").await
}

/// Requests data from an object store or index
pub async fn request_data<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &RequestDataParams,
) -> Result<RequestDataResult> {
    call(conn, "IndexedDB.requestData", params).await
}

/// Requests the database with the given name in the given origin
pub async fn request_database<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &RequestDatabaseParams,
) -> Result<RequestDatabaseResult> {
    call(conn, "IndexedDB.requestDatabase", params).await
}

pub async fn request_database_names<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &RequestDatabaseNamesParams,
) -> Result<RequestDatabaseNamesResult> {
    call(conn, "IndexedDB.requestDatabaseNames", params).await
}
