//! Contingency counting shared by the structure scores and the parameter estimators.
//!
//! Parent configurations are indexed exactly like CPT rows: parents in the
//! given order, first parent most significant.

use rustc_hash::FxHashMap;

use crate::engine::errors::TriageError;
use crate::engine::model::configuration_count;
use crate::storage::Dataset;

/// Largest dense table (configurations × states) the estimators will allocate.
pub const MAX_DENSE_CELLS: usize = 1 << 24;

/// Counts `N_jk` of child state `k` under parent configuration `j`, observed
/// configurations only.
#[derive(Debug, Clone)]
pub struct ContingencyTable {
    /// Number of parent configurations `q`, observed or not.
    pub configurations: usize,
    /// Child cardinality `r`.
    pub cardinality: usize,
    /// Observed configuration index -> per-state counts.
    pub observed: FxHashMap<usize, Vec<f64>>,
    /// Total number of records `N`.
    pub total: f64,
}

impl ContingencyTable {
    /// Tabulates a variable against a parent set.
    pub fn tabulate(
        data: &Dataset,
        variable: usize,
        parents: &[usize],
    ) -> Result<Self, TriageError> {
        let cardinality = data.cardinality(variable);
        let configurations = configuration_count(parents.iter().map(|&p| data.cardinality(p)))?;
        let child = data.column(variable);
        let parent_columns: Vec<(&[usize], usize)> = parents
            .iter()
            .map(|&p| (data.column(p), data.cardinality(p)))
            .collect();

        let mut observed: FxHashMap<usize, Vec<f64>> = FxHashMap::default();
        for (row, &state) in child.iter().enumerate() {
            let config = parent_columns
                .iter()
                .fold(0usize, |acc, (column, card)| acc * card + column[row]);
            observed.entry(config).or_insert_with(|| vec![0.0; cardinality])[state] += 1.0;
        }

        Ok(Self {
            configurations,
            cardinality,
            observed,
            total: child.len() as f64,
        })
    }

    /// Dense `q × r` counts, zero for unobserved configurations.
    pub fn to_dense(&self) -> Result<Vec<f64>, TriageError> {
        let cells = self
            .configurations
            .checked_mul(self.cardinality)
            .filter(|&cells| cells <= MAX_DENSE_CELLS)
            .ok_or_else(|| {
                TriageError::Validation(format!(
                    "conditional table with {} parent configurations is too large",
                    self.configurations
                ))
            })?;
        let mut dense = vec![0.0; cells];
        for (&config, counts) in &self.observed {
            let start = config * self.cardinality;
            dense[start..start + self.cardinality].copy_from_slice(counts);
        }
        Ok(dense)
    }

    /// Maximized log-likelihood `Σ_j Σ_k N_jk ln(N_jk / N_j)`.
    pub fn log_likelihood(&self) -> f64 {
        let mut ll = 0.0;
        for counts in self.observed.values() {
            let n_j: f64 = counts.iter().sum();
            for &n_jk in counts {
                if n_jk > 0.0 {
                    ll += n_jk * (n_jk / n_j).ln();
                }
            }
        }
        ll
    }

    /// Free parameters of the conditional table: `q (r - 1)`.
    pub fn free_parameters(&self) -> f64 {
        self.configurations as f64 * (self.cardinality as f64 - 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Dataset {
        let csv = "a,b,TYPE\n1,0,X\n1,1,Y\n0,1,Y\n1,1,Y\n";
        Dataset::from_reader(csv.as_bytes(), "TYPE").expect("load")
    }

    #[test]
    fn tabulates_observed_configurations() {
        let data = data();
        // config = 2a + b: row 0 -> 2 (X), rows 1 and 3 -> 3 (Y), row 2 -> 1 (Y)
        let table = ContingencyTable::tabulate(&data, 2, &[0, 1]).expect("table");
        assert_eq!(table.configurations, 4);
        assert_eq!(table.cardinality, 2);
        assert_eq!(table.observed.len(), 3);
        assert_eq!(table.observed[&2], vec![1.0, 0.0]);
        assert_eq!(table.observed[&3], vec![0.0, 2.0]);
        assert_eq!(table.total, 4.0);

        let dense = table.to_dense().expect("dense");
        assert_eq!(dense, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn log_likelihood_of_pure_split_is_zero() {
        let data = data();
        let table = ContingencyTable::tabulate(&data, 2, &[0, 1]).expect("table");
        assert!(table.log_likelihood().abs() < 1e-12);

        let marginal = ContingencyTable::tabulate(&data, 2, &[]).expect("marginal");
        let expected = 1.0 * (0.25f64).ln() + 3.0 * (0.75f64).ln();
        assert!((marginal.log_likelihood() - expected).abs() < 1e-12);
        assert_eq!(marginal.free_parameters(), 1.0);
    }
}
