mod assignment;
mod conflicts;
mod mutate;
mod parallel;
mod problem;
mod types;
mod util;
mod validate;

pub use conflicts::{
    detect_conflicts, score_parts, soft_score, violates_consecutive, violates_fixed_coverage,
    violates_request, violates_rest, violates_staffing, ScoreParts,
};
pub use problem::Problem;
pub use types::{
    CancelFlag, Conflict, ConflictKind, Generation, Grid, ObjectiveWeights, Outcome,
    RosterError, SearchStats, SolverConfig, MAX_CONSECUTIVE_WORKDAYS,
};
pub use validate::check;

use crate::model::{Nurse, PlanningMonth, RequestMap};
use crate::roster::Roster;
use crate::template::StaffingTemplate;
use assignment::Found;
use tracing::{debug, info};

/// Scheduler : génère le planning d'un mois à partir d'un modèle d'effectifs.
///
/// Aucun état n'est conservé d'un appel à l'autre ; le même scheduler peut servir
/// pour plusieurs mois.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SolverConfig,
    template: StaffingTemplate,
    cancel: CancelFlag,
}

impl Scheduler {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: StaffingTemplate) -> Self {
        self.template = template;
        self
    }

    /// Partage un drapeau d'annulation avec l'appelant (autre thread, signal...).
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Configuration effective : celle du scheduler, modifiée par les `rules` du modèle.
    pub fn config(&self) -> SolverConfig {
        self.template.solver_config(self.config)
    }

    pub fn template(&self) -> &StaffingTemplate {
        &self.template
    }

    /// Valide les entrées et construit l'instance du mois.
    pub fn problem(
        &self,
        year: i32,
        month: u32,
        nurses: &[Nurse],
        requests: &RequestMap,
    ) -> Result<Problem, RosterError> {
        self.template
            .validate()
            .map_err(|e| RosterError::InvalidInput(format!("staffing template: {e}")))?;
        let month = PlanningMonth::new(year, month)?;
        Problem::new(month, nurses, requests, self.template.requirement_for(month))
    }

    /// Recherche d'un planning faisable puis amélioration locale.
    ///
    /// `Infeasible` et `Timeout` sont des issues normales (`Ok`) ; seules les entrées
    /// invalides et une incohérence interne produisent une erreur.
    pub fn generate(
        &self,
        year: i32,
        month: u32,
        nurses: &[Nurse],
        requests: &RequestMap,
    ) -> Result<Generation, RosterError> {
        let problem = self.problem(year, month, nurses, requests)?;
        let config = self.config();
        info!(
            year,
            month,
            nurses = nurses.len(),
            requests = requests.len(),
            "generating roster"
        );

        let report = parallel::solve(&problem, &config, &self.cancel)?;
        let mut stats = SearchStats {
            nodes: report.nodes,
            backtracks: report.backtracks,
            ..SearchStats::default()
        };

        let generation = match report.found {
            Found::Feasible(grid) => {
                let improved = mutate::improve(&problem, grid, &config, &self.cancel);
                debug!(
                    moves = improved.moves,
                    initial = improved.initial,
                    best = improved.best,
                    "local search done"
                );
                validate::ensure(&problem, &improved.grid)?;
                stats.improving_moves = improved.moves;
                stats.initial_score = improved.initial;
                stats.final_score = improved.best;
                Generation {
                    outcome: Outcome::Feasible,
                    roster: Some(Roster::from_grid(&problem, &improved.grid)?),
                    stats,
                }
            }
            Found::Infeasible(unmet) => Generation {
                outcome: Outcome::Infeasible { unmet },
                roster: None,
                stats,
            },
            Found::Timeout => Generation {
                outcome: Outcome::Timeout { nodes: report.nodes },
                roster: None,
                stats,
            },
        };
        info!(
            outcome = ?generation.outcome,
            nodes = stats.nodes,
            score = stats.final_score,
            "generation finished"
        );
        Ok(generation)
    }

    /// Revalide un roster existant contre les demandes et le modèle d'effectifs.
    pub fn check_roster(
        &self,
        roster: &Roster,
        nurses: &[Nurse],
        requests: &RequestMap,
    ) -> Result<Vec<Conflict>, RosterError> {
        let problem = self.problem(roster.year(), roster.month(), nurses, requests)?;
        let grid = roster.to_grid(&problem)?;
        validate::check(&problem, &grid)
    }
}

/// Génère le planning d'un mois avec le modèle d'effectifs et les réglages par défaut.
pub fn generate(
    year: i32,
    month: u32,
    nurses: &[Nurse],
    requests: &RequestMap,
) -> Result<Generation, RosterError> {
    Scheduler::default().generate(year, month, nurses, requests)
}
