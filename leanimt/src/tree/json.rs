//! Structural JSON import/export of the full node matrix.
//!
//! Intended for round-tripping state between identically configured trees,
//! independent of the leaf persistence layer. Scalars follow the element
//! type's own textual form; big integers render as decimal strings through
//! [`export_json_with`](LeanImt::export_json_with).

use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{build_levels, Equal, Hasher, LeanImt, TreeState};
use crate::error::LeanImtError;

impl<N: Clone + PartialEq> LeanImt<N> {
    /// Serialize the node matrix as a nested JSON array using the element
    /// type's `Serialize`.
    pub fn export_json(&self) -> Result<String, LeanImtError>
    where
        N: Serialize,
    {
        let state = self.read_state();
        Ok(serde_json::to_string(&state.nodes)?)
    }

    /// Serialize the node matrix rendering each element through `fmt`
    /// (e.g. a big integer to its decimal string).
    pub fn export_json_with<F>(&self, fmt: F) -> Result<String, LeanImtError>
    where
        F: Fn(&N) -> String,
    {
        let state = self.read_state();
        let rendered: Vec<Vec<String>> = state
            .nodes
            .iter()
            .map(|level| level.iter().map(&fmt).collect())
            .collect();
        Ok(serde_json::to_string(&rendered)?)
    }

    /// Parse a node matrix exported by [`export_json`](LeanImt::export_json)
    /// into a new in-memory tree.
    ///
    /// The matrix is validated against the supplied hash: level shapes, the
    /// hash rule and the lean rule must all hold, otherwise the import is
    /// rejected as corrupted data.
    pub fn import_json(
        hash: Hasher<N>,
        eq: Option<Equal<N>>,
        json: &str,
    ) -> Result<Self, LeanImtError>
    where
        N: DeserializeOwned,
    {
        let nodes: Vec<Vec<N>> = serde_json::from_str(json)?;
        Self::from_matrix(hash, eq, nodes)
    }

    /// Parse a node matrix passing every JSON scalar through `map` to build
    /// elements (non-string scalars are handed to `map` in their compact
    /// JSON form).
    pub fn import_json_with<F>(
        hash: Hasher<N>,
        eq: Option<Equal<N>>,
        json: &str,
        map: F,
    ) -> Result<Self, LeanImtError>
    where
        F: Fn(&str) -> Result<N, LeanImtError>,
    {
        let raw: Vec<Vec<Value>> = serde_json::from_str(json)?;
        let mut nodes = Vec::with_capacity(raw.len());
        for level in raw {
            let mut parsed = Vec::with_capacity(level.len());
            for value in level {
                let element = match value {
                    Value::String(s) => map(&s)?,
                    other => map(&other.to_string())?,
                };
                parsed.push(element);
            }
            nodes.push(parsed);
        }
        Self::from_matrix(hash, eq, nodes)
    }

    fn from_matrix(
        hash: Hasher<N>,
        eq: Option<Equal<N>>,
        mut nodes: Vec<Vec<N>>,
    ) -> Result<Self, LeanImtError> {
        if nodes.is_empty() {
            nodes.push(Vec::new());
        }

        let expected = build_levels(nodes[0].clone(), &hash);
        if expected.len() != nodes.len() {
            return Err(LeanImtError::CorruptedData(format!(
                "node matrix has {} levels, expected {}",
                nodes.len(),
                expected.len()
            )));
        }
        let equal = |a: &N, b: &N| match &eq {
            Some(eq) => eq(a, b),
            None => a == b,
        };
        for (level, (exp, got)) in expected.iter().zip(&nodes).enumerate() {
            if exp.len() != got.len() {
                return Err(LeanImtError::CorruptedData(format!(
                    "level {level} has {} nodes, expected {}",
                    got.len(),
                    exp.len()
                )));
            }
            if !exp.iter().zip(got).all(|(a, b)| equal(a, b)) {
                return Err(LeanImtError::CorruptedData(format!(
                    "level {level} does not match the supplied hash"
                )));
            }
        }

        Ok(Self {
            hash,
            eq,
            state: RwLock::new(TreeState {
                nodes,
                persistence: None,
                dirty: false,
            }),
        })
    }
}
