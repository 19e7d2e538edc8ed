use crate::model::{NurseId, ShiftCode, ShiftKind, Unit};
use crate::roster::Roster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Plafond légal de jours travaillés consécutifs.
pub const MAX_CONSECUTIVE_WORKDAYS: usize = 6;

/// Pondération de l'objectif souple (plus bas = meilleur).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectiveWeights {
    /// Par jour travaillé hors du poste majoritaire.
    pub preference: f64,
    /// Multiplie la variance du nombre de repos par infirmière.
    pub fairness: f64,
    /// Par utilisation de `F`.
    pub fixed_f: f64,
    /// Par poste tenu en renfort dans l'autre unité (`A1`, `E1`, `N1`).
    pub support: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            preference: 10.0,
            fairness: 4.0,
            fixed_f: 1.0,
            support: 1.0,
        }
    }
}

/// Options de résolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverConfig {
    /// Nombre maximal de nœuds visités avant `Timeout`.
    pub node_budget: u64,
    /// Nombre maximal de mouvements améliorants acceptés.
    pub local_search_iterations: usize,
    /// Nombre maximal de passes complètes de recherche locale.
    pub local_search_passes: usize,
    /// Série de jours travaillés à partir de laquelle le repos est essayé en premier.
    pub tired_threshold: usize,
    /// Nombre de threads pour la répartition des branches racines (1 = séquentiel).
    pub workers: usize,
    pub weights: ObjectiveWeights,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            node_budget: 2_000_000,
            local_search_iterations: 500,
            local_search_passes: 8,
            tired_threshold: 5,
            workers: 1,
            weights: ObjectiveWeights::default(),
        }
    }
}

/// Drapeau d'annulation coopératif, partagé entre threads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Grille d'affectation `[infirmière][jour - 1]`, éventuellement partielle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    days: usize,
    cells: Vec<Option<ShiftCode>>,
}

impl Grid {
    pub fn new(nurses: usize, days: usize) -> Self {
        Self {
            days,
            cells: vec![None; nurses * days],
        }
    }

    pub fn nurses(&self) -> usize {
        if self.days == 0 {
            0
        } else {
            self.cells.len() / self.days
        }
    }

    pub fn days(&self) -> usize {
        self.days
    }

    /// `day` est 0-indexé.
    pub fn get(&self, nurse: usize, day: usize) -> Option<ShiftCode> {
        if day >= self.days {
            return None;
        }
        self.cells.get(nurse * self.days + day).copied().flatten()
    }

    pub fn set(&mut self, nurse: usize, day: usize, code: Option<ShiftCode>) {
        if day < self.days {
            if let Some(cell) = self.cells.get_mut(nurse * self.days + day) {
                *cell = code;
            }
        }
    }

    pub fn row(&self, nurse: usize) -> &[Option<ShiftCode>] {
        let start = nurse * self.days;
        self.cells.get(start..start + self.days).unwrap_or(&[])
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictKind {
    /// Effectif différent du besoin (`found` < `required` : déficit, sinon excédent).
    Coverage {
        unit: Unit,
        kind: ShiftKind,
        required: u32,
        found: u32,
    },
    RestViolation,
    ConsecutiveDays,
    RequestIgnored,
    /// `C` hors titulaire, `F` par un titulaire, ou `F` alors qu'un titulaire est disponible.
    FixedCoverage,
}

/// Contrainte dure non satisfaite, localisée à un jour (1-indexé).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Conflict {
    pub day: u32,
    pub nurse: Option<NurseId>,
    pub kind: ConflictKind,
}

impl Conflict {
    pub fn coverage(unit: Unit, kind: ShiftKind, day: u32, required: u32, found: u32) -> Self {
        Self {
            day,
            nurse: None,
            kind: ConflictKind::Coverage {
                unit,
                kind,
                required,
                found,
            },
        }
    }

    pub fn for_nurse(nurse: &NurseId, day: u32, kind: ConflictKind) -> Self {
        Self {
            day,
            nurse: Some(nurse.clone()),
            kind,
        }
    }

    pub fn is_coverage(&self) -> bool {
        matches!(self.kind, ConflictKind::Coverage { .. })
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self.nurse.as_ref().map(NurseId::as_str).unwrap_or("-");
        match &self.kind {
            ConflictKind::Coverage {
                unit,
                kind,
                required,
                found,
            } if found < required => write!(
                f,
                "{unit} {kind} coverage unmet on day {} (required {required}, found {found})",
                self.day
            ),
            ConflictKind::Coverage {
                unit,
                kind,
                required,
                found,
            } => write!(
                f,
                "{unit} {kind} coverage exceeded on day {} (required {required}, found {found})",
                self.day
            ),
            ConflictKind::RestViolation => {
                write!(f, "rest interval violated by {who} on day {}", self.day)
            }
            ConflictKind::ConsecutiveDays => write!(
                f,
                "more than {MAX_CONSECUTIVE_WORKDAYS} consecutive workdays for {who} ending day {}",
                self.day
            ),
            ConflictKind::RequestIgnored => {
                write!(f, "request of {who} not honoured on day {}", self.day)
            }
            ConflictKind::FixedCoverage => {
                write!(f, "C/F substitution rule broken on day {} ({who})", self.day)
            }
        }
    }
}

/// Issue d'une génération.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum Outcome {
    Feasible,
    /// Aucune affectation légale : `unmet` liste les contraintes en cause.
    Infeasible {
        #[serde(serialize_with = "display_list")]
        unmet: Vec<Conflict>,
    },
    /// Budget de recherche épuisé (ou annulation) sans solution.
    Timeout { nodes: u64 },
}

fn display_list<S: serde::Serializer>(items: &[Conflict], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(items.iter().map(ToString::to_string))
}

impl Outcome {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Outcome::Feasible)
    }
}

/// Compteurs de la recherche.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SearchStats {
    pub nodes: u64,
    pub backtracks: u64,
    pub improving_moves: usize,
    pub initial_score: f64,
    pub final_score: f64,
}

/// Résultat de `generate` : le roster n'est présent que si l'issue est `Feasible`.
#[derive(Debug, Clone)]
pub struct Generation {
    pub outcome: Outcome,
    pub roster: Option<Roster>,
    pub stats: SearchStats,
}

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}
