//! Gesture events accepted from the tree presentation.
//!
//! Field names follow the presentation's JSON spelling (`checkedKeys`,
//! `dragKey`, ...). Only the node key is read from `info.node`; any other
//! fields the presentation sends along are ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureNode {
    pub key: String,
}

impl GestureNode {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInfo {
    pub node: GestureNode,
    pub checked: bool,
}

/// Checkbox toggle on a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEvent {
    #[serde(default)]
    pub checked_keys: Vec<String>,
    pub info: CheckInfo,
}

impl CheckEvent {
    pub fn new(key: impl Into<String>, checked: bool) -> Self {
        Self {
            checked_keys: Vec::new(),
            info: CheckInfo {
                node: GestureNode::new(key),
                checked,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectInfo {
    pub node: GestureNode,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectEvent {
    #[serde(default)]
    pub selected_keys: Vec<String>,
    pub info: SelectInfo,
}

/// Where a dragged node lands relative to the drop target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
    /// First child of the drop target, which must be a group.
    Inside,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragInfo {
    pub drag_key: String,
    pub drop_key: String,
    pub position: DropPosition,
}

impl DragInfo {
    pub fn new(drag_key: impl Into<String>, drop_key: impl Into<String>, position: DropPosition) -> Self {
        Self {
            drag_key: drag_key.into(),
            drop_key: drop_key.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckEvent, DragInfo, DropPosition, SelectEvent};

    #[test]
    fn parses_presentation_payloads() {
        let check: CheckEvent = serde_json::from_str(
            r#"{"checkedKeys": ["3", "4"], "info": {"node": {"key": "4", "title": "X"}, "checked": true}}"#,
        )
        .unwrap();
        assert_eq!(check.checked_keys, vec!["3", "4"]);
        assert_eq!(check.info.node.key, "4");
        assert!(check.info.checked);

        let drag: DragInfo =
            serde_json::from_str(r#"{"dragKey": "~3.0", "dropKey": "1", "position": "inside"}"#)
                .unwrap();
        assert_eq!(drag, DragInfo::new("~3.0", "1", DropPosition::Inside));

        let select: SelectEvent = serde_json::from_str(
            r#"{"selectedKeys": ["9"], "info": {"node": {"key": "9"}, "selected": true}}"#,
        )
        .unwrap();
        assert_eq!(select.selected_keys, vec!["9"]);
    }
}
