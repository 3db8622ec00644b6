/// Adaptive item selection.
///
/// Items that hold the same score are interchangeable for selection, so
/// weights live per score bin: the kernel is evaluated once per
/// (player scaled score, item score) cell and the bin's weight is split
/// uniformly over its current members.
use rand::Rng;

use crate::constants::SELECTION_KERNEL_SHARPNESS;
use crate::entity::Entity;

/// `exp(-2 * (ln((Ri+1)/(ni-Ri+1)) - ln((Rj+1)/(nj-Rj+1)))^2)`.
///
/// Peaks at 1 when both urns sit at the same (smoothed) log-odds, so similar
/// players and items are paired most often.
pub fn selection_kernel(r_i: u32, r_j: u32, n_i: u32, n_j: u32) -> f64 {
    let diff = smoothed_logit(r_i, n_i) - smoothed_logit(r_j, n_j);
    (-SELECTION_KERNEL_SHARPNESS * diff * diff).exp()
}

fn smoothed_logit(r: u32, n: u32) -> f64 {
    ((r as f64 + 1.0) / (n as f64 - r as f64 + 1.0)).ln()
}

/// Cached kernel values, `(player_scale + 1) x (item_urn_size + 1)`, row-major.
#[derive(Debug, Clone)]
pub struct SelectionTable {
    player_scale: u32,
    item_urn_size: u32,
    weights: Vec<f64>,
}

impl SelectionTable {
    pub fn new(player_scale: u32, item_urn_size: u32) -> Self {
        let mut weights = Vec::with_capacity((player_scale as usize + 1) * (item_urn_size as usize + 1));
        for p in 0..=player_scale {
            for i in 0..=item_urn_size {
                weights.push(selection_kernel(p, i, player_scale, item_urn_size));
            }
        }
        SelectionTable { player_scale, item_urn_size, weights }
    }

    pub fn player_scale(&self) -> u32 {
        self.player_scale
    }

    pub fn item_urn_size(&self) -> u32 {
        self.item_urn_size
    }

    pub fn row(&self, scaled_score: u32) -> &[f64] {
        let width = self.item_urn_size as usize + 1;
        let start = scaled_score as usize * width;
        &self.weights[start..start + width]
    }

    pub fn weight(&self, scaled_score: u32, item_score: u32) -> f64 {
        self.row(scaled_score)[item_score as usize]
    }

    /// Probability that a player at `scaled_score` picks one particular item
    /// holding `item_score`, given `counts[b]` items in each bin.
    pub fn selection_probability(&self, scaled_score: u32, item_score: u32, counts: &[usize]) -> f64 {
        let normaliser: f64 = self
            .row(scaled_score)
            .iter()
            .zip(counts)
            .map(|(&w, &c)| w * c as f64)
            .sum();
        if normaliser <= 0.0 {
            return 0.0;
        }
        self.weight(scaled_score, item_score) / normaliser
    }
}

/// Item positions grouped by current score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBins {
    bins: Vec<Vec<usize>>,
}

impl ItemBins {
    pub fn new(item_urn_size: u32, items: &[Entity]) -> Self {
        let mut bins = ItemBins {
            bins: vec![Vec::new(); item_urn_size as usize + 1],
        };
        bins.rebuild(items);
        bins
    }

    /// Re-bucket every item by its current score.
    pub fn rebuild(&mut self, items: &[Entity]) {
        for bin in &mut self.bins {
            bin.clear();
        }
        for (idx, item) in items.iter().enumerate() {
            self.bins[item.score() as usize].push(idx);
        }
    }

    pub fn members(&self, score: u32) -> &[usize] {
        &self.bins[score as usize]
    }

    pub fn counts(&self) -> Vec<usize> {
        self.bins.iter().map(Vec::len).collect()
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Draw an item position for a player at `scaled_score`: a bin with
    /// probability proportional to `weight * members`, then a member uniformly.
    pub fn select(&self, table: &SelectionTable, scaled_score: u32, rng: &mut impl Rng) -> usize {
        let row = table.row(scaled_score);
        let bin_weights: Vec<f64> = self
            .bins
            .iter()
            .zip(row)
            .map(|(members, &w)| w * members.len() as f64)
            .collect();
        let total_weight: f64 = bin_weights.iter().sum();

        let bin = if total_weight > 0.0 {
            weighted_random_select(&bin_weights, total_weight, rng)
        } else {
            // Kernel underflow everywhere: fall back to a uniform item.
            let occupied: Vec<usize> = (0..self.bins.len()).filter(|&b| !self.bins[b].is_empty()).collect();
            occupied[rng.random_range(0..occupied.len())]
        };

        let members = &self.bins[bin];
        members[rng.random_range(0..members.len())]
    }
}

/// Index drawn with probability `weights[j] / total_weight`; zero weights are never returned.
fn weighted_random_select(weights: &[f64], total_weight: f64, rng: &mut impl Rng) -> usize {
    let mut r = rng.random::<f64>() * total_weight;
    let mut last_positive = 0;
    for (j, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        last_positive = j;
        r -= w;
        if r < 0.0 {
            return j;
        }
    }
    last_positive
}
