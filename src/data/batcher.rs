// ============================================================
// Layer 4 — CVAE Batcher
// ============================================================
// Stacks a slice of CvaeSamples into tensors:
//
//   Input:  N samples, signal width W, condition widths C_1..C_k
//   Output: signal [N, W], conditions [N, C_1] .. [N, C_k], target [N, W]
//
// Every row is flattened into one Vec<f32> per field, then
// reshaped to [N, width]. All rows of a field share a width
// (checked when the samples were built).
//
// Training and validation both go through Burn's DataLoader;
// `loader` builds one with the batch size and optional seed.

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};
use std::sync::Arc;

use crate::data::dataset::{CvaeDataset, CvaeSample};

#[derive(Debug, Clone)]
pub struct CvaeBatch<B: Backend> {
    /// [batch, input_dim]
    pub signal:     Tensor<B, 2>,
    /// One [batch, width] tensor per condition slot, in layout order.
    pub conditions: Vec<Tensor<B, 2>>,
    /// [batch, input_dim]
    pub target:     Tensor<B, 2>,
}

impl<B: Backend> CvaeBatch<B> {
    pub fn size(&self) -> usize {
        self.signal.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct CvaeBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> CvaeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Burn DataLoader over `dataset` on this batcher's device.
    /// `shuffle` reseeds the order every epoch; `None` keeps row order.
    pub fn loader(
        self,
        dataset:    CvaeDataset,
        batch_size: usize,
        shuffle:    Option<u64>,
    ) -> Arc<dyn DataLoader<B, CvaeBatch<B>>> {
        let device  = self.device.clone();
        let builder = DataLoaderBuilder::new(self).batch_size(batch_size).set_device(device);
        match shuffle {
            Some(seed) => builder.shuffle(seed).build(dataset),
            None       => builder.build(dataset),
        }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// The DataLoader calls .batch(items, device) with each mini-batch.
impl<B: Backend> Batcher<B, CvaeSample, CvaeBatch<B>> for CvaeBatcher<B> {
    fn batch(&self, items: Vec<CvaeSample>, device: &B::Device) -> CvaeBatch<B> {
        let width = |row: Option<&Vec<f32>>| row.map_or(0, Vec::len);
        let first = items.first();

        let signal = stack(items.iter().map(|s| s.signal.as_slice()), width(first.map(|s| &s.signal)), device);
        let target = stack(items.iter().map(|s| s.target.as_slice()), width(first.map(|s| &s.target)), device);
        let conditions = first
            .map(|f| f.conditions.as_slice())
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(slot, c)| stack(items.iter().map(|s| s.conditions[slot].as_slice()), c.len(), device))
            .collect();

        CvaeBatch { signal, conditions, target }
    }
}

fn stack<'a, B: Backend>(
    rows:   impl Iterator<Item = &'a [f32]>,
    width:  usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.flat_map(|r| r.iter().copied()).collect();
    let n = flat.len() / width.max(1);
    Tensor::<B, 2>::from_data(TensorData::new(flat, [n, width]), device)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::layout::InputLayout;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(v: f32) -> CvaeSample {
        CvaeSample {
            signal:     vec![v, v + 1.0, v + 2.0],
            conditions: vec![vec![v * 10.0], vec![0.0, 1.0]],
            target:     vec![v, v + 1.0, v + 2.0],
        }
    }

    fn first_column(batch: &CvaeBatch<TestBackend>) -> Vec<f32> {
        batch.conditions[0].clone().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_batch_shapes_and_row_order() {
        let device  = Default::default();
        let batcher = CvaeBatcher::<TestBackend>::new(device);
        let batch   = batcher.batch(vec![sample(1.0), sample(2.0)], &device);

        assert_eq!(batch.size(), 2);
        assert_eq!(batch.signal.dims(), [2, 3]);
        assert_eq!(batch.conditions.len(), 2);
        assert_eq!(batch.conditions[1].dims(), [2, 2]);
        assert_eq!(first_column(&batch), vec![10.0, 20.0]);
    }

    #[test]
    fn test_unshuffled_loader_keeps_row_order() {
        let samples: Vec<CvaeSample> = (0..5).map(|i| sample(i as f32)).collect();
        let dataset = CvaeDataset::new(InputLayout::with_signal(3), samples);
        let loader  = CvaeBatcher::<TestBackend>::new(Default::default()).loader(dataset, 2, None);

        let batches: Vec<_> = loader.iter().collect();
        assert_eq!(batches.iter().map(CvaeBatch::size).collect::<Vec<_>>(), vec![2, 2, 1]);
        let tau: Vec<f32> = batches.iter().flat_map(first_column).collect();
        assert_eq!(tau, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_shuffled_loader_visits_every_row_once() {
        let samples: Vec<CvaeSample> = (0..6).map(|i| sample(i as f32)).collect();
        let dataset = CvaeDataset::new(InputLayout::with_signal(3), samples);
        let loader  = CvaeBatcher::<TestBackend>::new(Default::default()).loader(dataset, 4, Some(7));

        let mut tau: Vec<f32> = loader.iter().flat_map(|b| first_column(&b)).collect();
        tau.sort_by(f32::total_cmp);
        assert_eq!(tau, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }
}
