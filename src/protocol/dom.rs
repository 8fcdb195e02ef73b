//! DOM domain bindings
//!
//! A subset of <https://chromedevtools.github.io/devtools-protocol/tot/DOM/>.

use crate::cdp::command::{call, call_unit, call_without_params, CdpEventKind};
use crate::cdp::traits::CdpConnection;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Depth value requesting the entire subtree
pub const ENTIRE_SUBTREE: i32 = -1;

/// Unique DOM node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

/// Node identifier usable before the node has been pushed to the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendNodeId(pub i64);

/// Backend node with a friendly name
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendNode {
    pub node_type: i32,
    pub node_name: String,
    pub backend_node_id: BackendNodeId,
}

/// Mirror of a DOM node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub backend_node_id: BackendNodeId,
    pub node_type: i32,
    pub node_name: String,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub node_value: String,
    #[serde(default)]
    pub child_node_count: Option<i32>,
    #[serde(default)]
    pub children: Option<Vec<Node>>,
    /// Flat `[name1, value1, name2, value2, ...]` list
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(rename = "documentURL", default)]
    pub document_url: Option<String>,
    #[serde(rename = "baseURL", default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub content_document: Option<Box<Node>>,
    #[serde(default)]
    pub shadow_roots: Option<Vec<Node>>,
    #[serde(default)]
    pub pseudo_type: Option<String>,
    #[serde(default)]
    pub shadow_root_type: Option<String>,
    #[serde(rename = "isSVG", default)]
    pub is_svg: Option<bool>,
}

impl Node {
    /// Value of attribute `name`, if present
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.as_ref()?.chunks_exact(2).find_map(|pair| {
            if pair[0] == name {
                Some(pair[1].as_str())
            } else {
                None
            }
        })
    }
}

/// Quad vertices, x immediately followed by y for each point, clock-wise
pub type Quad = Vec<f64>;

/// Box model of a node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxModel {
    pub content: Quad,
    pub padding: Quad,
    pub border: Quad,
    pub margin: Quad,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub shape_outside: Option<serde_json::Value>,
}

/// Rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
}

/// Node reference accepted by methods that take "one of" node/backend node/object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl From<NodeId> for NodeRef {
    fn from(node_id: NodeId) -> Self {
        Self {
            node_id: Some(node_id),
            ..Self::default()
        }
    }
}

/// DOM.getDocument parameters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDocumentParams {
    /// Maximum depth of children to retrieve; [`ENTIRE_SUBTREE`] for all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pierce: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResult {
    pub root: Node,
}

/// DOM.describeNode parameters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeNodeParams {
    #[serde(flatten)]
    pub node: NodeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pierce: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescribeNodeResult {
    pub node: Node,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorParams {
    pub node_id: NodeId,
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorResult {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorAllResult {
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeIdParams {
    node_id: NodeId,
}

#[derive(Debug, Clone, Deserialize)]
struct AttributesResult {
    attributes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OuterHtmlResult {
    #[serde(rename = "outerHTML")]
    outer_html: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttributeValueParams {
    pub node_id: NodeId,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BoxModelResult {
    model: BoxModel,
}

/// DOM.performSearch parameters
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformSearchParams {
    /// Plain text, query selector or XPath
    pub query: String,
    #[serde(
        rename = "includeUserAgentShadowDOM",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_user_agent_shadow_dom: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformSearchResult {
    pub search_id: String,
    pub result_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSearchResultsParams {
    pub search_id: String,
    pub from_index: i64,
    pub to_index: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeIdsResult {
    node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchIdParams<'a> {
    search_id: &'a str,
}

/// Enables DOM agent for the given page
pub async fn enable<C: CdpConnection + ?Sized>(conn: &C) -> Result<()> {
    call_without_params(conn, "DOM.enable").await
}

/// Disables DOM agent for the given page
pub async fn disable<C: CdpConnection + ?Sized>(conn: &C) -> Result<()> {
    call_without_params(conn, "DOM.disable").await
}

/// Returns the root DOM node (and optionally the subtree)
pub async fn get_document<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &GetDocumentParams,
) -> Result<GetDocumentResult> {
    call(conn, "DOM.getDocument", params).await
}

/// Describes a node given its id; does not require the node to be pushed
pub async fn describe_node<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &DescribeNodeParams,
) -> Result<DescribeNodeResult> {
    call(conn, "DOM.describeNode", params).await
}

/// Executes `querySelector` on a given node
pub async fn query_selector<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &QuerySelectorParams,
) -> Result<QuerySelectorResult> {
    call(conn, "DOM.querySelector", params).await
}

/// Executes `querySelectorAll` on a given node
pub async fn query_selector_all<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &QuerySelectorParams,
) -> Result<QuerySelectorAllResult> {
    call(conn, "DOM.querySelectorAll", params).await
}

/// Returns the attributes of an element as a flat name/value list
pub async fn get_attributes<C: CdpConnection + ?Sized>(conn: &C, node_id: NodeId) -> Result<Vec<String>> {
    let result: AttributesResult = call(conn, "DOM.getAttributes", &NodeIdParams { node_id }).await?;
    Ok(result.attributes)
}

/// Returns the node's HTML markup
pub async fn get_outer_html<C: CdpConnection + ?Sized>(conn: &C, node: &NodeRef) -> Result<String> {
    let result: OuterHtmlResult = call(conn, "DOM.getOuterHTML", node).await?;
    Ok(result.outer_html)
}

pub async fn set_attribute_value<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &SetAttributeValueParams,
) -> Result<()> {
    call_unit(conn, "DOM.setAttributeValue", params).await
}

pub async fn remove_node<C: CdpConnection + ?Sized>(conn: &C, node_id: NodeId) -> Result<()> {
    call_unit(conn, "DOM.removeNode", &NodeIdParams { node_id }).await
}

pub async fn get_box_model<C: CdpConnection + ?Sized>(conn: &C, node: &NodeRef) -> Result<BoxModel> {
    let result: BoxModelResult = call(conn, "DOM.getBoxModel", node).await?;
    Ok(result.model)
}

/// Starts a search; results are read with [`get_search_results`]
pub async fn perform_search<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &PerformSearchParams,
) -> Result<PerformSearchResult> {
    call(conn, "DOM.performSearch", params).await
}

pub async fn get_search_results<C: CdpConnection + ?Sized>(
    conn: &C,
    params: &GetSearchResultsParams,
) -> Result<Vec<NodeId>> {
    let result: NodeIdsResult = call(conn, "DOM.getSearchResults", params).await?;
    Ok(result.node_ids)
}

pub async fn discard_search_results<C: CdpConnection + ?Sized>(conn: &C, search_id: &str) -> Result<()> {
    call_unit(conn, "DOM.discardSearchResults", &SearchIdParams { search_id }).await
}

/// Fired when an element attribute is modified
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeModifiedEvent {
    pub node_id: NodeId,
    pub name: String,
    pub value: String,
}

impl CdpEventKind for AttributeModifiedEvent {
    const NAME: &'static str = "DOM.attributeModified";
}

/// Mirrors the `DOMNodeInserted` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildNodeInsertedEvent {
    pub parent_node_id: NodeId,
    pub previous_node_id: NodeId,
    pub node: Node,
}

impl CdpEventKind for ChildNodeInsertedEvent {
    const NAME: &'static str = "DOM.childNodeInserted";
}

/// Fired when the document has been totally updated; node ids are no longer valid
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentUpdatedEvent {}

impl CdpEventKind for DocumentUpdatedEvent {
    const NAME: &'static str = "DOM.documentUpdated";
}

/// Fired when the backend wants to provide the client with missing nodes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChildNodesEvent {
    pub parent_id: NodeId,
    pub nodes: Vec<Node>,
}

impl CdpEventKind for SetChildNodesEvent {
    const NAME: &'static str = "DOM.setChildNodes";
}
