// ============================================================
// Layer 3 — Named Sub-Graphs
// ============================================================
// The trainable graph is made of independently addressable
// parts. Each one can be frozen, swapped or persisted on its own,
// and each owns one weight file in a snapshot directory.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::CvaeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubGraph {
    /// The whole composed model.
    Cvae,
    Encoder,
    Decoder,
    EmbeddingEnc,
    EmbeddingDec,
}

impl SubGraph {
    /// Parts whose trainability can be toggled.
    pub const FREEZABLE: [SubGraph; 4] = [
        SubGraph::Encoder,
        SubGraph::Decoder,
        SubGraph::EmbeddingEnc,
        SubGraph::EmbeddingDec,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SubGraph::Cvae         => "cvae",
            SubGraph::Encoder      => "encoder",
            SubGraph::Decoder      => "decoder",
            SubGraph::EmbeddingEnc => "embedding_enc",
            SubGraph::EmbeddingDec => "embedding_dec",
        }
    }

    /// Parse a list of names such as `["encoder", "embedding_enc"]`.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<SubGraph>, CvaeError> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for SubGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubGraph {
    type Err = CvaeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cvae"          => Ok(SubGraph::Cvae),
            "encoder"       => Ok(SubGraph::Encoder),
            "decoder"       => Ok(SubGraph::Decoder),
            "embedding_enc" => Ok(SubGraph::EmbeddingEnc),
            "embedding_dec" => Ok(SubGraph::EmbeddingDec),
            other           => Err(CvaeError::UnknownSubGraph(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let parsed = SubGraph::parse_list(&["encoder", "embedding_dec"]).unwrap();
        assert_eq!(parsed, vec![SubGraph::Encoder, SubGraph::EmbeddingDec]);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = "latent".parse::<SubGraph>().unwrap_err();
        assert!(err.to_string().contains("unknown sub-graph 'latent'"));
    }

    #[test]
    fn test_names_round_trip() {
        for sg in [SubGraph::Cvae].into_iter().chain(SubGraph::FREEZABLE) {
            assert_eq!(sg.name().parse::<SubGraph>().unwrap(), sg);
        }
    }
}
