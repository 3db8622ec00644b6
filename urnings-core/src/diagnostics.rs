/// Run diagnostics: model-fit table, green-ball ledger and series autocorrelation.
///
/// Read-only views for whoever inspects a run afterwards. The session writes
/// to them once per match; nothing here feeds back into the rules.

/// Observed vs. expected results per `(player scaled score, item score)` cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitTable {
    player_scale: u32,
    item_urn_size: u32,
    counts: Vec<u64>,
    result_sums: Vec<u64>,
    expected_sums: Vec<u64>,
}

impl FitTable {
    pub fn new(player_scale: u32, item_urn_size: u32) -> Self {
        let cells = (player_scale as usize + 1) * (item_urn_size as usize + 1);
        FitTable {
            player_scale,
            item_urn_size,
            counts: vec![0; cells],
            result_sums: vec![0; cells],
            expected_sums: vec![0; cells],
        }
    }

    fn cell(&self, scaled_score: u32, item_score: u32) -> usize {
        scaled_score as usize * (self.item_urn_size as usize + 1) + item_score as usize
    }

    pub fn record(&mut self, scaled_score: u32, item_score: u32, result: u8, expected: u8) {
        let cell = self.cell(scaled_score, item_score);
        self.counts[cell] += 1;
        self.result_sums[cell] += result as u64;
        self.expected_sums[cell] += expected as u64;
    }

    pub fn player_scale(&self) -> u32 {
        self.player_scale
    }

    pub fn item_urn_size(&self) -> u32 {
        self.item_urn_size
    }

    pub fn count(&self, scaled_score: u32, item_score: u32) -> u64 {
        self.counts[self.cell(scaled_score, item_score)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Share of observed wins in the cell; `None` if no match landed there.
    pub fn observed_proportion(&self, scaled_score: u32, item_score: u32) -> Option<f64> {
        let cell = self.cell(scaled_score, item_score);
        proportion(self.result_sums[cell], self.counts[cell])
    }

    /// Share of expected wins in the cell; `None` if no match landed there.
    pub fn expected_proportion(&self, scaled_score: u32, item_score: u32) -> Option<f64> {
        let cell = self.cell(scaled_score, item_score);
        proportion(self.expected_sums[cell], self.counts[cell])
    }
}

fn proportion(sum: u64, count: u64) -> Option<f64> {
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Population totals, one entry per match plus the initial value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GreenBallLedger {
    /// Green balls across all item urns.
    pub item_green_balls: Vec<u64>,
    /// Green balls across all player and item urns.
    pub total_green_balls: Vec<u64>,
    /// Sum of all urn sizes.
    pub total_balls: Vec<u64>,
}

impl GreenBallLedger {
    pub(crate) fn record(&mut self, item_green: u64, player_green: u64, total_balls: u64) {
        self.item_green_balls.push(item_green);
        self.total_green_balls.push(item_green + player_green);
        self.total_balls.push(total_balls);
    }

    /// Item green balls now minus at the start of the run.
    pub fn item_drift(&self) -> i64 {
        match (self.item_green_balls.first(), self.item_green_balls.last()) {
            (Some(&first), Some(&last)) => last as i64 - first as i64,
            _ => 0,
        }
    }
}

/// Sample autocorrelation of `series` at `lag`.
///
/// `None` when the series is shorter than `lag + 2` or constant. Constancy is
/// checked on the values themselves: the float mean of a constant series need
/// not equal its value, which leaves a tiny nonzero variance.
pub fn autocorrelation(series: &[f64], lag: usize) -> Option<f64> {
    let n = series.len();
    if n < lag + 2 || series.iter().all(|&x| x == series[0]) {
        return None;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let variance: f64 = series.iter().map(|x| (x - mean).powi(2)).sum();
    if variance <= 0.0 {
        return None;
    }
    let covariance: f64 = series
        .iter()
        .zip(&series[lag..])
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum();
    Some(covariance / variance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_table_proportions() {
        let mut fit = FitTable::new(4, 2);
        assert_eq!(fit.observed_proportion(1, 1), None);

        fit.record(1, 1, 1, 0);
        fit.record(1, 1, 1, 1);
        fit.record(1, 1, 0, 0);
        fit.record(4, 2, 1, 1);

        assert_eq!(fit.count(1, 1), 3);
        assert_eq!(fit.total(), 4);
        assert_eq!(fit.observed_proportion(1, 1), Some(2.0 / 3.0));
        assert_eq!(fit.expected_proportion(1, 1), Some(1.0 / 3.0));
        assert_eq!(fit.observed_proportion(4, 2), Some(1.0));
        assert_eq!(fit.count(0, 0), 0);
    }

    #[test]
    fn test_ledger_drift() {
        let mut ledger = GreenBallLedger::default();
        assert_eq!(ledger.item_drift(), 0);
        ledger.record(20, 10, 64);
        ledger.record(22, 9, 64);
        ledger.record(19, 12, 64);
        assert_eq!(ledger.item_drift(), -1);
        assert_eq!(ledger.total_green_balls, vec![30, 31, 31]);
    }

    #[test]
    fn test_autocorrelation() {
        let alternating: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let r1 = autocorrelation(&alternating, 1).unwrap();
        assert!((r1 + 0.99).abs() < 1e-9);
        let r2 = autocorrelation(&alternating, 2).unwrap();
        assert!((r2 - 0.98).abs() < 1e-9);

        assert_eq!(autocorrelation(&alternating, 0), Some(1.0));
        assert_eq!(autocorrelation(&[0.3; 10], 1), None);
        assert_eq!(autocorrelation(&[0.1, 0.2], 1), None);
    }

    #[test]
    fn test_autocorrelation_constant_series() {
        // Urn sizes that are not powers of two give estimates like 0.3 whose
        // float mean drifts off the value itself.
        for value in [0.1, 0.3, 0.7, 0.5, 3.0 / 40.0] {
            for len in [3, 10, 41, 1001] {
                let series = vec![value; len];
                assert_eq!(autocorrelation(&series, 1), None, "value {value}, len {len}");
                assert_eq!(autocorrelation(&series, 2), None, "value {value}, len {len}");
            }
        }
        let mut step = vec![0.3; 20];
        step[10] = 0.35;
        assert!(autocorrelation(&step, 1).is_some());
    }
}
