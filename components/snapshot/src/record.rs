//! Snapshot record model.

use core_types::{ScopeId, Value};
use interpreter::{Frame, Object, Protos, Scope};
use parser::Node;
use serde::{Deserialize, Serialize};

/// Bumped when the record encoding changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Interpreter-global singletons carried in the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Globals {
    /// The global scope's arena id
    pub global_scope: ScopeId,
    /// The prototype registry
    pub protos: Protos,
    /// The completion value of the last expression statement
    pub last_value: Value,
    /// The configured stack-depth limit
    pub stack_limit: usize,
}

/// The leading record of every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Format version of the record encoding
    pub version: u32,
    /// Registered native names in tag order; the loader verifies this
    /// against the freshly registered table
    pub natives: Vec<String>,
    /// Interpreter-global singletons
    pub globals: Globals,
}

/// One line of a snapshot file.
///
/// Entities appear in a fixed section order (header, nodes, scopes,
/// objects, frames); within each section the position is the arena index,
/// which is what inter-record references mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// The header; always first
    Header(Header),
    /// A syntax-tree node
    Node(Node),
    /// A lexical scope
    Scope(Scope),
    /// A heap object
    Object(Object),
    /// An execution stack frame, bottom first
    Frame(Frame),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let record = Record::Node(Node::EmptyStatement);
        let text = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_header_round_trip() {
        let header = Header {
            version: FORMAT_VERSION,
            natives: vec!["Object".to_string(), "cc.log".to_string()],
            globals: Globals {
                global_scope: ScopeId(0),
                protos: Protos::placeholder(),
                last_value: Value::Number(f64::NAN),
                stack_limit: 10_000,
            },
        };
        let text = serde_json::to_string(&Record::Header(header.clone())).unwrap();
        match serde_json::from_str::<Record>(&text).unwrap() {
            Record::Header(back) => {
                assert_eq!(back.version, header.version);
                assert_eq!(back.natives, header.natives);
                // NaN survives the number codec.
                assert!(matches!(back.globals.last_value, Value::Number(n) if n.is_nan()));
            }
            other => panic!("expected header, got {:?}", other),
        }
    }
}
