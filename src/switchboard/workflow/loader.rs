// SPDX-License-Identifier: MIT

//! Graph loader - YAML file loading and parsing

use super::types::GraphDefinition;
use crate::adk::error::SwitchboardError;
use std::fs;
use std::path::Path;

/// Loads graph definitions from YAML files
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphLoader;

impl GraphLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a graph definition from a YAML file
    pub fn load_graph<P: AsRef<Path>>(&self, path: P) -> Result<GraphDefinition, SwitchboardError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SwitchboardError::config(format!("cannot read graph file {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse a graph definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<GraphDefinition, SwitchboardError> {
        let def: GraphDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switchboard::workflow::state::{FieldType, ReducerType};
    use crate::switchboard::workflow::types::StepKind;

    #[test]
    fn test_parse_full_graph() {
        let yaml = r#"
name: drafting
description: "Write, check, retry"
entry: generate
recursion_limit: 12
strictness: deny

state:
  draft: { type: text }
  trials: { type: integer, default: 0 }
  sendable: { type: boolean }
  notes:
    type: list
    reducer: append
    max_items: 5

steps:
  - id: generate
    uses: write_draft
  - id: verify
    uses: check_draft
    timeout_secs: 10
  - id: finalize
    set:
      status: done
  - id: nested
    graph:
      file: child.yaml

edges:
  - from: generate
    to: verify
  - from: finalize
    to: END

routes:
  - from: verify
    branches:
      - when: "sendable"
        to: finalize
      - when: "trials < 3"
        to: generate
    default: nested
"#;
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "drafting");
        assert_eq!(def.recursion_limit, Some(12));
        assert_eq!(def.steps.len(), 4);
        assert_eq!(def.state.fields["notes"].reducer, ReducerType::Append);
        assert_eq!(def.state.fields["trials"].field_type, FieldType::Integer);
        assert_eq!(def.steps[1].timeout_secs, Some(10));
        assert!(matches!(def.steps[2].kind().unwrap(), StepKind::Set(_)));
        assert!(matches!(def.steps[3].kind().unwrap(), StepKind::Graph(g) if g.file == "child.yaml"));
        assert_eq!(def.routes[0].branches.len(), 2);
        assert_eq!(def.routes[0].default, "nested");
    }

    #[test]
    fn test_parse_minimal_graph() {
        let yaml = "name: tiny\nentry: a\nsteps:\n  - id: a\n    uses: x\n";
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        assert!(def.edges.is_empty());
        assert!(def.routes.is_empty());
        assert!(def.state.fields.is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(matches!(
            GraphLoader::parse_yaml("name: [unclosed"),
            Err(SwitchboardError::Yaml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = GraphLoader::new().load_graph("/nonexistent/graph.yaml").unwrap_err();
        assert!(matches!(err, SwitchboardError::Config(ref m) if m.contains("graph.yaml")));
    }
}
