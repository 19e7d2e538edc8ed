use super::conflicts::{
    fixed_coverage_at, fixed_f_count, off_count, preference_misses, rest_broken_at, run_broken_at,
    support_count, variance, ScoreParts,
};
use super::problem::Problem;
use super::types::{CancelFlag, Grid, SolverConfig, MAX_CONSECUTIVE_WORKDAYS};
use crate::model::{ShiftCode, ShiftKind, Unit};
use tracing::{debug, trace};

/// Bilan de la recherche locale.
#[derive(Debug, Clone)]
pub(crate) struct Improvement {
    pub grid: Grid,
    pub moves: usize,
    pub initial: f64,
    pub best: f64,
}

/// Recherche locale à partir d'une grille faisable : échanges de postes entre deux
/// infirmières (un jour, ou deux jours consécutifs). Les effectifs sont conservés par
/// construction ; un mouvement n'est gardé que s'il reste légal et fait baisser le score.
pub(crate) fn improve(
    problem: &Problem,
    grid: Grid,
    config: &SolverConfig,
    cancel: &CancelFlag,
) -> Improvement {
    let mut state = State::new(problem, grid, config);
    let initial = state.score();
    let mut best = initial;
    let mut moves = 0;

    'passes: for pass in 0..config.local_search_passes {
        let before = moves;
        for d in 0..problem.days() {
            for i in 0..problem.nurse_count() {
                for j in i + 1..problem.nurse_count() {
                    if moves >= config.local_search_iterations || cancel.is_cancelled() {
                        break 'passes;
                    }
                    for width in [1, 2] {
                        if let Some(score) = state.try_swap(i, j, d, width, best) {
                            trace!(day = d + 1, i, j, width, score, "improving swap");
                            best = score;
                            moves += 1;
                        }
                    }
                }
            }
        }
        debug!(pass, accepted = moves - before, score = best, "local search pass");
        if moves == before {
            break;
        }
    }

    Improvement {
        grid: state.grid,
        moves,
        initial,
        best,
    }
}

struct State<'p> {
    problem: &'p Problem,
    grid: Grid,
    config: &'p SolverConfig,
    offs: Vec<u32>,
    preference: u32,
    fixed_f: u32,
    support: u32,
}

impl<'p> State<'p> {
    fn new(problem: &'p Problem, grid: Grid, config: &'p SolverConfig) -> Self {
        let n = problem.nurse_count();
        Self {
            offs: (0..n).map(|i| off_count(&grid, i)).collect(),
            preference: (0..n).map(|i| preference_misses(problem, &grid, i)).sum(),
            fixed_f: (0..n).map(|i| fixed_f_count(&grid, i)).sum(),
            support: (0..n).map(|i| support_count(&grid, i)).sum(),
            problem,
            grid,
            config,
        }
    }

    fn score(&self) -> f64 {
        ScoreParts {
            preference: self.preference,
            off_variance: variance(&self.offs),
            fixed_f: self.fixed_f,
            support: self.support,
        }
        .total(&self.config.weights)
    }

    fn slot(&self, n: usize, d: usize) -> Option<(Unit, ShiftKind)> {
        let unit = self.problem.nurses()[n].unit;
        self.grid.get(n, d).and_then(|c| c.counts_toward(unit))
    }

    /// Code que `n` doit porter pour tenir le besoin `slot` (repos si aucun).
    fn code_for(&self, n: usize, slot: Option<(Unit, ShiftKind)>) -> Option<ShiftCode> {
        match slot {
            None => Some(ShiftCode::Off),
            Some((unit, kind)) => ShiftCode::for_slot(
                unit,
                kind,
                self.problem.nurses()[n].unit,
                self.problem.is_holder(n),
            ),
        }
    }

    /// Échange les besoins tenus par `i` et `j` sur `width` jours à partir de `d`.
    /// Renvoie le nouveau score si le mouvement est gardé.
    fn try_swap(&mut self, i: usize, j: usize, d: usize, width: usize, best: f64) -> Option<f64> {
        let days = self.problem.days();
        if d + width > days {
            return None;
        }
        let mut changes = Vec::with_capacity(2 * width);
        for day in d..d + width {
            if self.problem.request(i, day).is_some() || self.problem.request(j, day).is_some() {
                return None;
            }
            let (si, sj) = (self.slot(i, day), self.slot(j, day));
            if si == sj {
                continue;
            }
            changes.push((i, day, self.code_for(i, sj)?));
            changes.push((j, day, self.code_for(j, si)?));
        }
        if changes.is_empty() {
            return None;
        }

        let undo: Vec<(usize, usize, Option<ShiftCode>)> = changes
            .iter()
            .map(|&(n, day, _)| (n, day, self.grid.get(n, day)))
            .collect();
        for &(n, day, code) in &changes {
            self.put(n, day, Some(code));
        }

        if self.legal_after(&changes) {
            let score = self.score();
            if score < best {
                return Some(score);
            }
        }
        for (n, day, code) in undo {
            self.put(n, day, code);
        }
        None
    }

    fn put(&mut self, n: usize, d: usize, code: Option<ShiftCode>) {
        let old = self.grid.get(n, d);
        self.account(n, old, false);
        self.grid.set(n, d, code);
        self.account(n, code, true);
    }

    fn account(&mut self, n: usize, code: Option<ShiftCode>, add: bool) {
        let Some(code) = code else { return };
        let wanted = self.problem.nurses()[n].major_shift.kind();
        let step = |v: &mut u32| {
            if add {
                *v += 1
            } else {
                *v -= 1
            }
        };
        if code.is_off() {
            step(&mut self.offs[n]);
        }
        if code == ShiftCode::F {
            step(&mut self.fixed_f);
        } else if code.is_support() {
            step(&mut self.support);
        }
        if code.kind().is_some_and(|k| k != wanted) {
            step(&mut self.preference);
        }
    }

    fn legal_after(&self, changes: &[(usize, usize, ShiftCode)]) -> bool {
        let days = self.problem.days();
        for &(n, d, _) in changes {
            if rest_broken_at(&self.grid, n, d) || (d + 1 < days && rest_broken_at(&self.grid, n, d + 1)) {
                return false;
            }
            let last = (d + MAX_CONSECUTIVE_WORKDAYS).min(days - 1);
            if (d..=last).any(|e| run_broken_at(&self.grid, n, e)) {
                return false;
            }
            if !fixed_coverage_at(self.problem, &self.grid, d).is_empty() {
                return false;
            }
        }
        true
    }
}
