//! The JSON envelope carried inside the compressed payload, and its
//! conversion to and from a [`Graph`].

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use objgraph_core::chunk::{Chunk, ChunkId};
use objgraph_core::graph::node::{Node, NodeId, NodeMetadata, TypeTag};
use objgraph_core::graph::pointer::PointerInfo;
use objgraph_core::graph::{Graph, GraphError};

use crate::format::WireError;

/// Free-text metadata fields that are armored when not printable ASCII.
const ARMORED_FIELDS: [&str; 3] = ["type_name", "module_name", "name"];

/// How chunk checksum mismatches are handled on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Record mismatches and keep going.
    #[default]
    Lenient,
    /// Fail on the first mismatch.
    Strict,
}

/// A chunk whose bytes do not match its stored checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub chunk_id: ChunkId,
    pub expected: String,
    pub actual: String,
}

/// A node that names a chunk id absent from the chunk table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingChunk {
    pub node_id: NodeId,
    pub chunk_id: ChunkId,
}

/// Outcome of per-chunk verification during a load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Chunks whose checksum was compared.
    pub chunks_checked: usize,
    /// Legacy chunks without a stored checksum.
    pub unchecked: usize,
    pub mismatches: Vec<ChecksumMismatch>,
    pub missing_chunks: Vec<MissingChunk>,
}

impl IntegrityReport {
    /// True if no mismatch or missing chunk was recorded.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.missing_chunks.is_empty()
    }
}

/// Top-level envelope document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub root_id: NodeId,
    pub nodes: Vec<NodeRecord>,
    pub chunks: Vec<ChunkRecord>,
    pub pointers: Vec<PointerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Wire code of the node's [`TypeTag`].
    #[serde(rename = "type")]
    pub type_code: u8,
    pub meta: MetaRecord,
    pub chunk_ids: Vec<ChunkId>,
}

/// Node metadata plus the list of armored fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    #[serde(flatten)]
    pub meta: NodeMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encoded_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    /// Standard base64 of the chunk bytes.
    pub data: String,
    /// Lowercase hex SHA-256. Empty in legacy payloads.
    #[serde(default)]
    pub sha256: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRecord {
    pub from_node: NodeId,
    #[serde(default)]
    pub from_chunk: ChunkId,
    #[serde(default)]
    pub offset: usize,
    pub to_node: NodeId,
    pub field: String,
}

impl Envelope {
    /// Flatten a graph into envelope records.
    pub fn from_graph(graph: &Graph) -> Envelope {
        let mut nodes = Vec::with_capacity(graph.node_count());
        let mut chunks = Vec::with_capacity(graph.chunk_count());

        for node in graph.nodes() {
            chunks.extend(node.chunks.iter().map(|c| ChunkRecord {
                id: c.id,
                data: c.encoded.clone(),
                sha256: c.checksum.clone(),
                size: c.original_size,
            }));
            nodes.push(NodeRecord {
                id: node.id,
                type_code: node.tag.code(),
                meta: armor(&node.meta),
                chunk_ids: node.chunks.iter().map(|c| c.id).collect(),
            });
        }

        let pointers = graph
            .pointers()
            .map(|p| PointerRecord {
                from_node: p.from_node_id,
                from_chunk: p.from_chunk_id,
                offset: p.offset,
                to_node: p.to_node_id,
                field: p.field_name.clone(),
            })
            .collect();

        Envelope {
            root_id: graph.root_id(),
            nodes,
            chunks,
            pointers,
        }
    }

    /// Rebuild a graph, verifying every chunk checksum under `policy`.
    pub fn into_graph(self, policy: ChecksumPolicy) -> Result<(Graph, IntegrityReport), WireError> {
        let mut report = IntegrityReport::default();

        let mut table: HashMap<ChunkId, Chunk> = HashMap::with_capacity(self.chunks.len());
        for record in self.chunks {
            let chunk = Chunk::from_encoded(record.id, record.data, record.sha256, record.size)?;
            if !chunk.has_checksum() {
                report.unchecked += 1;
            } else {
                report.chunks_checked += 1;
                if !chunk.verify() {
                    let mismatch = ChecksumMismatch {
                        chunk_id: chunk.id,
                        expected: chunk.checksum.clone(),
                        actual: chunk.computed_checksum(),
                    };
                    if policy == ChecksumPolicy::Strict {
                        return Err(WireError::ChecksumMismatch {
                            chunk_id: mismatch.chunk_id,
                        });
                    }
                    warn!(
                        chunk_id = mismatch.chunk_id,
                        expected = %mismatch.expected,
                        actual = %mismatch.actual,
                        "chunk checksum mismatch"
                    );
                    report.mismatches.push(mismatch);
                }
            }
            if table.insert(chunk.id, chunk).is_some() {
                return Err(WireError::DuplicateChunk(record.id));
            }
        }

        let mut graph = Graph::new();
        graph.set_root(self.root_id);

        for record in self.nodes {
            let tag = TypeTag::from_code(record.type_code).ok_or(WireError::UnknownTypeTag {
                node_id: record.id,
                code: record.type_code,
            })?;
            let meta = unarmor(record.meta)?;

            let mut chunks = Vec::with_capacity(record.chunk_ids.len());
            for chunk_id in record.chunk_ids {
                match table.remove(&chunk_id) {
                    Some(chunk) => chunks.push(chunk),
                    None => {
                        if policy == ChecksumPolicy::Strict {
                            return Err(WireError::MissingChunk {
                                node_id: record.id,
                                chunk_id,
                            });
                        }
                        warn!(node_id = record.id, chunk_id, "node names unknown chunk");
                        report.missing_chunks.push(MissingChunk {
                            node_id: record.id,
                            chunk_id,
                        });
                    }
                }
            }

            let mut node = Node::new(record.id, tag).with_chunks(chunks);
            node.meta = meta;
            graph.add_node(node).map_err(|e| match e {
                GraphError::DuplicateNode(id) => WireError::DuplicateNode(id),
                other => WireError::Graph(other),
            })?;
        }

        for p in self.pointers {
            graph.add_pointer(PointerInfo {
                from_node_id: p.from_node,
                from_chunk_id: p.from_chunk,
                offset: p.offset,
                to_node_id: p.to_node,
                field_name: p.field,
            });
        }
        graph.rebuild_node_pointers();

        Ok((graph, report))
    }
}

fn needs_armor(text: &str) -> bool {
    !text.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

fn field_mut<'a>(meta: &'a mut NodeMetadata, field: &str) -> Option<&'a mut String> {
    match field {
        "type_name" => Some(&mut meta.type_name),
        "module_name" => Some(&mut meta.module_name),
        "name" => Some(&mut meta.name),
        _ => None,
    }
}

fn armor(meta: &NodeMetadata) -> MetaRecord {
    let mut record = MetaRecord {
        meta: meta.clone(),
        encoded_fields: Vec::new(),
    };
    for field in ARMORED_FIELDS {
        if let Some(text) = field_mut(&mut record.meta, field) {
            if needs_armor(text) {
                *text = BASE64_STANDARD.encode(text.as_bytes());
                record.encoded_fields.push(field.to_string());
            }
        }
    }
    record
}

fn unarmor(record: MetaRecord) -> Result<NodeMetadata, WireError> {
    let MetaRecord {
        mut meta,
        encoded_fields,
    } = record;
    for field in encoded_fields {
        let Some(text) = field_mut(&mut meta, &field) else {
            return Err(WireError::InvalidMetadata(format!(
                "unknown encoded field {field}"
            )));
        };
        let raw = BASE64_STANDARD
            .decode(text.as_bytes())
            .map_err(|e| WireError::InvalidMetadata(format!("field {field}: {e}")))?;
        *text = String::from_utf8(raw)
            .map_err(|e| WireError::InvalidMetadata(format!("field {field}: {e}")))?;
    }
    Ok(meta)
}
