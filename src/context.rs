//! Identity of this process within a cooperating worker group.
use std::fmt;

/// Launcher environment variables, as `(rank, size)` pairs, in lookup order.
const LAUNCHER_VARS: [(&str, &str); 3] = [
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

/// Rank and group size of this process, fixed for its lifetime.
///
/// Used only to tag log records; no work is partitioned by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessContext {
    /// 0-based rank within the group
    pub rank: usize,
    /// Number of processes in the group
    pub size: usize,
}

impl ProcessContext {
    /// Context for `rank` of `size`.
    pub fn new(rank: usize, size: usize) -> Self {
        Self { rank, size }
    }

    /// Read rank and size from the first MPI/PMI/Slurm launcher variables that are set,
    /// falling back to a single-process group.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        LAUNCHER_VARS
            .iter()
            .find_map(|&(rank_var, size_var)| {
                let rank = lookup(rank_var)?.trim().parse().ok()?;
                let size = lookup(size_var)?.trim().parse().ok()?;
                (rank < size).then_some(Self { rank, size })
            })
            .unwrap_or_default()
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self { rank: 0, size: 1 }
    }
}

impl fmt::Display for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank: {}/{}", self.rank, self.size)
    }
}
