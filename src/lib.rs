// ============================================================
// leap-cvae: Conditional VAEs with LEAP conditioning
// ============================================================
// Layered, top to bottom:
//
//   cli          Layer 1  argument parsing, dispatch
//   application  Layer 2  train / encode workflows
//   domain       Layer 3  plain types: priors, sub-graphs, layouts
//   data         Layer 4  columns → samples → tensor batches
//   ml           Layer 5  every Burn module, the losses, training
//   infra        Layer 6  weights, histories, metrics on disk
//
// Errors: `error` holds the typed library errors; Layers 1-2
// wrap them in anyhow.

#![recursion_limit = "256"]

pub mod cli;
pub mod application;
pub mod domain;
pub mod data;
pub mod ml;
pub mod infra;
pub mod error;
