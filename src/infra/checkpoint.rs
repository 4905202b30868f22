// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores weights one sub-graph at a time, using
// Burn's NamedMpkGzFileRecorder at full precision (a save/load
// round trip reproduces the weights bit for bit).
//
// File layout of one snapshot directory:
//   models/
//     cvae.mpk.gz            ← the whole composed model
//     encoder.mpk.gz
//     decoder.mpk.gz
//     embedding_enc.mpk.gz   ← only when the variant has an embedding
//     embedding_dec.mpk.gz   ← same weights as embedding_enc when shared
//     snapshot.json          ← WeightSnapshot: which files were written
//     cvae_config.json       ← architecture, to rebuild before loading
//
// Loading needs a model of the same architecture first; the
// record is then poured into it with load_record().

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::subgraph::SubGraph;
use crate::error::{CvaeError, CvaeResult};
use crate::ml::{config::CvaeConfig, model::Cvae};

pub const CONFIG_FILE:   &str = "cvae_config.json";
pub const SNAPSHOT_FILE: &str = "snapshot.json";
const WEIGHT_EXTENSION:  &str = "mpk.gz";

type WeightRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Which sub-graph went to which file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub entries: BTreeMap<SubGraph, PathBuf>,
}

impl WeightSnapshot {
    pub fn contains(&self, subgraph: SubGraph) -> bool {
        self.entries.contains_key(&subgraph)
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> CvaeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder; it appends the extension itself.
    fn stem(&self, subgraph: SubGraph) -> PathBuf {
        self.dir.join(subgraph.name())
    }

    pub fn weight_file(&self, subgraph: SubGraph) -> PathBuf {
        self.dir.join(format!("{}.{WEIGHT_EXTENSION}", subgraph.name()))
    }

    /// Write one module's parameters to `<dir>/<subgraph>.mpk.gz`.
    pub fn save_module<B: Backend, M: Module<B>>(&self, module: &M, subgraph: SubGraph) -> CvaeResult<PathBuf> {
        let path = self.weight_file(subgraph);
        WeightRecorder::new()
            .record(module.clone().into_record(), self.stem(subgraph))
            .map_err(|e| CvaeError::Record { path: path.clone(), reason: e.to_string() })?;
        tracing::debug!("Saved {} weights to '{}'", subgraph, path.display());
        Ok(path)
    }

    /// Read `<dir>/<subgraph>.mpk.gz` into a module of the same architecture.
    pub fn load_module<B: Backend, M: Module<B>>(
        &self,
        module:   M,
        subgraph: SubGraph,
        device:   &B::Device,
    ) -> CvaeResult<M> {
        let path = self.weight_file(subgraph);
        let record = WeightRecorder::new()
            .load(self.stem(subgraph), device)
            .map_err(|e| CvaeError::Record { path: path.clone(), reason: e.to_string() })?;
        tracing::debug!("Loaded {} weights from '{}'", subgraph, path.display());
        Ok(module.load_record(record))
    }

    /// Persist every named sub-graph of `model`.
    pub fn save_model<B: Backend>(&self, model: &Cvae<B>) -> CvaeResult<WeightSnapshot> {
        let mut entries = BTreeMap::new();
        entries.insert(SubGraph::Cvae, self.save_module(model, SubGraph::Cvae)?);
        entries.insert(SubGraph::Encoder, self.save_module(&model.encoder, SubGraph::Encoder)?);
        entries.insert(SubGraph::Decoder, self.save_module(&model.decoder, SubGraph::Decoder)?);

        if let Some(enc) = &model.embedding_enc {
            entries.insert(SubGraph::EmbeddingEnc, self.save_module(enc, SubGraph::EmbeddingEnc)?);
            let dec = model.embedding_dec.as_ref().unwrap_or(enc);
            entries.insert(SubGraph::EmbeddingDec, self.save_module(dec, SubGraph::EmbeddingDec)?);
        }

        let snapshot = WeightSnapshot { entries };
        fs::write(self.dir.join(SNAPSHOT_FILE), serde_json::to_string_pretty(&snapshot)?)?;
        tracing::info!("Saved {} weight files to '{}'", snapshot.entries.len(), self.dir.display());
        Ok(snapshot)
    }

    /// Restore the whole model from `cvae.mpk.gz`.
    pub fn load_model<B: Backend>(&self, model: Cvae<B>, device: &B::Device) -> CvaeResult<Cvae<B>> {
        self.load_module(model, SubGraph::Cvae, device)
    }

    pub fn load_snapshot(&self) -> CvaeResult<WeightSnapshot> {
        let json = fs::read_to_string(self.dir.join(SNAPSHOT_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_config(&self, config: &CvaeConfig) -> CvaeResult<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(config)?)?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> CvaeResult<CvaeConfig> {
        let json = fs::read_to_string(self.dir.join(CONFIG_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }
}
