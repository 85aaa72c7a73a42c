//! What every test runs against: the cluster plus its environment.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::cluster::ClusterState;
use crate::fence::Fencer;

/// Randomness and out-of-band node control.
pub struct Environment {
    seed: u64,
    rng: StdRng,
    fencer: Arc<dyn Fencer>,
}

impl Environment {
    /// Create an environment; without a seed one is drawn at random and can
    /// be read back with [`seed`](Self::seed) to replay the run.
    pub fn new(seed: Option<u64>, fencer: Arc<dyn Fencer>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            fencer,
        }
    }

    /// Seed the random choices were drawn from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniformly random index below `len`; `None` when `len` is zero.
    pub fn random_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..len))
    }

    /// Uniformly random node from `nodes`.
    pub fn random_node(&mut self, nodes: &[String]) -> Option<String> {
        self.random_index(nodes.len()).map(|i| nodes[i].clone())
    }

    /// Power-cycle `node` out of band.
    pub async fn reset_node(&self, node: &str) -> bool {
        self.fencer.reset(node).await
    }
}

/// A cluster under test and the environment driving it.
pub struct Harness {
    /// Intended-status tracker and command driver.
    pub cluster: ClusterState,
    /// Randomness and fencing.
    pub env: Environment,
}

impl Harness {
    /// Bundle a cluster with its environment.
    pub fn new(cluster: ClusterState, env: Environment) -> Self {
        Self { cluster, env }
    }

    /// Uniformly random configured node.
    ///
    /// The node list is validated non-empty at configuration load.
    pub fn random_node(&mut self) -> String {
        self.env
            .random_node(self.cluster.nodes())
            .unwrap_or_else(|| self.cluster.local_node().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::MockFencer;

    fn nodes() -> Vec<String> {
        vec!["alpha".into(), "beta".into(), "gamma".into()]
    }

    #[test]
    fn same_seed_same_choices() {
        let mut a = Environment::new(Some(7), Arc::new(MockFencer::new()));
        let mut b = Environment::new(Some(7), Arc::new(MockFencer::new()));

        let picks_a: Vec<_> = (0..20).map(|_| a.random_node(&nodes())).collect();
        let picks_b: Vec<_> = (0..20).map(|_| b.random_node(&nodes())).collect();

        assert_eq!(picks_a, picks_b);
        assert_eq!(a.seed(), 7);
    }

    #[test]
    fn empty_choice_is_none() {
        let mut env = Environment::new(None, Arc::new(MockFencer::new()));
        assert_eq!(env.random_index(0), None);
        assert_eq!(env.random_node(&[]), None);
    }

    #[test]
    fn every_node_gets_picked() {
        let mut env = Environment::new(Some(1), Arc::new(MockFencer::new()));
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(env.random_node(&nodes()).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn reset_goes_through_fencer() {
        let fencer = MockFencer::new();
        let env = Environment::new(Some(1), Arc::new(fencer.clone()));

        assert!(env.reset_node("beta").await);
        assert_eq!(fencer.resets(), vec!["beta"]);
    }
}
