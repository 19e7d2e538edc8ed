#![forbid(unsafe_code)]
//! nurse-roster — génération déterministe du planning mensuel de deux unités de soins.
//!
//! - Effectifs exacts par unité et par poste, renforts croisés 9E/10E.
//! - Repos minimal entre deux postes, 6 jours travaillés consécutifs au plus.
//! - Demandes impératives (repos, postes imposés) toujours respectées.
//! - Recherche avec propagation et retour arrière, puis amélioration locale de l'équité.

pub mod io;
pub mod model;
pub mod roster;
pub mod scheduler;
pub mod storage;
pub mod template;

pub use model::{
    MajorShift, Nurse, NurseId, PlanningMonth, RequestMap, ShiftCode, ShiftKind,
    StaffingRequirement, Unit,
};
pub use roster::{DailySchedule, DayCount, NurseSchedule, Roster, RosterSummary};
pub use scheduler::{
    generate, CancelFlag, Conflict, ConflictKind, Generation, ObjectiveWeights, Outcome,
    RosterError, Scheduler, SearchStats, SolverConfig,
};
pub use storage::{JsonStore, RosterSink, StaffSource};
pub use template::{
    export_template_json, load_template_from_file, Headcount, Override, Rules, StaffingTemplate,
};
