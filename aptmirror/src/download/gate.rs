//! Commit ordering between actions.
//!
//! An index document may only be committed once every package file it
//! references (and that is part of this run) has been committed, and the
//! Release family of a distribution only after all of that distribution's
//! index documents. The gate keeps a count of unfinished dependencies per
//! action and hands out actions as their count reaches zero.
//!
//! If a dependency does not commit, the dependent is withheld and so is
//! everything that depends on it: the mirror keeps its previous index rather
//! than publishing one that advertises a missing file.

use std::collections::HashMap;

use super::action::{ActionRole, DownloadAction};

/// Result of completing an action.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GateUpdate {
    /// Actions whose dependencies have all committed.
    pub ready: Vec<usize>,
    /// Actions that can no longer be committed.
    pub withheld: Vec<usize>,
}

/// Dependency tracker for a list of actions, addressed by index.
#[derive(Debug)]
pub struct CommitGate {
    remaining: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    withheld: Vec<bool>,
}

impl CommitGate {
    /// Build the dependency graph for `actions`.
    pub fn new(actions: &[DownloadAction]) -> Self {
        let mut gate = Self {
            remaining: vec![0; actions.len()],
            dependents: vec![Vec::new(); actions.len()],
            withheld: vec![false; actions.len()],
        };

        let indexes: HashMap<&str, usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| matches!(a.role, ActionRole::Index { .. }))
            .map(|(id, a)| (a.path.as_str(), id))
            .collect();

        for (id, action) in actions.iter().enumerate() {
            match &action.role {
                ActionRole::Package { referenced_by } => {
                    for index in referenced_by {
                        if let Some(&dependent) = indexes.get(index.as_str()) {
                            gate.add_edge(id, dependent);
                        }
                    }
                }
                ActionRole::Index { .. } => {}
                ActionRole::Release { distribution } => {
                    for (dependency, other) in actions.iter().enumerate() {
                        if matches!(&other.role, ActionRole::Index { distribution: d } if d == distribution)
                        {
                            gate.add_edge(dependency, id);
                        }
                    }
                }
            }
        }

        gate
    }

    fn add_edge(&mut self, dependency: usize, dependent: usize) {
        if !self.dependents[dependency].contains(&dependent) {
            self.dependents[dependency].push(dependent);
            self.remaining[dependent] += 1;
        }
    }

    /// Actions that can start immediately, in list order.
    pub fn initially_ready(&self) -> Vec<usize> {
        (0..self.remaining.len())
            .filter(|&id| self.remaining[id] == 0)
            .collect()
    }

    /// Number of dependencies `id` is still waiting for.
    #[cfg(test)]
    fn pending_dependencies(&self, id: usize) -> usize {
        self.remaining.get(id).copied().unwrap_or(0)
    }

    /// Record that `id` reached a terminal state.
    ///
    /// # Arguments
    ///
    /// * `id` - The finished action
    /// * `committed` - Whether its file was published
    ///
    /// # Returns
    ///
    /// Dependents that became ready, and dependents (transitively) withheld
    /// because this action did not commit.
    pub fn complete(&mut self, id: usize, committed: bool) -> GateUpdate {
        let mut update = GateUpdate::default();
        let mut failed = Vec::new();

        let dependents = std::mem::take(&mut self.dependents[id]);
        for dependent in dependents {
            self.remaining[dependent] = self.remaining[dependent].saturating_sub(1);
            if !committed {
                if !self.withheld[dependent] {
                    self.withheld[dependent] = true;
                    update.withheld.push(dependent);
                    failed.push(dependent);
                }
            } else if self.remaining[dependent] == 0 && !self.withheld[dependent] {
                update.ready.push(dependent);
            }
        }

        // A withheld action never runs, so its own dependents fail too.
        while let Some(id) = failed.pop() {
            for dependent in std::mem::take(&mut self.dependents[id]) {
                self.remaining[dependent] = self.remaining[dependent].saturating_sub(1);
                if !self.withheld[dependent] {
                    self.withheld[dependent] = true;
                    update.withheld.push(dependent);
                    failed.push(dependent);
                }
            }
        }

        update
    }
}
