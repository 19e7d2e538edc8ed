use super::problem::Problem;
use super::types::{CancelFlag, Conflict, ConflictKind, Grid, SolverConfig, MAX_CONSECUTIVE_WORKDAYS};
use super::util::{Domain, RestTable};
use crate::model::{ShiftCode, ShiftKind, Unit};
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// Nombre maximal de catégories rapportées pour une instance infaisable.
pub(crate) const UNMET_LIMIT: usize = 5;

/// États de la recherche arborescente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Init,
    Propagate,
    Branch,
    Backtrack,
    Solution,
    Infeasible,
    Timeout,
}

#[derive(Debug, Clone)]
pub(crate) enum Found {
    Feasible(Grid),
    Infeasible(Vec<Conflict>),
    Timeout,
}

#[derive(Debug, Clone)]
pub(crate) struct SearchReport {
    pub found: Found,
    pub nodes: u64,
    pub backtracks: u64,
    pub tally: Tally,
}

/// Échecs rencontrés pendant la recherche, regroupés par jour, infirmière, règle et
/// besoin. Chaque catégorie garde son occurrence la plus grave : pour un besoin, le plus
/// petit effectif constaté, donc un déficit plutôt qu'un excédent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Tally(BTreeMap<Conflict, (u32, Conflict)>);

impl Tally {
    fn key(conflict: &Conflict) -> Conflict {
        let mut key = conflict.clone();
        if let ConflictKind::Coverage {
            required, found, ..
        } = &mut key.kind
        {
            *required = 0;
            *found = 0;
        }
        key
    }

    fn add(&mut self, conflict: Conflict, count: u32) {
        let entry = self
            .0
            .entry(Self::key(&conflict))
            .or_insert_with(|| (0, conflict.clone()));
        entry.0 += count;
        if conflict < entry.1 {
            entry.1 = conflict;
        }
    }

    pub fn record(&mut self, conflict: Conflict) {
        self.add(conflict, 1);
    }

    /// Cumule les échecs d'une autre branche.
    pub fn absorb(&mut self, other: Tally) {
        for (_, (count, worst)) in other.0 {
            self.add(worst, count);
        }
    }

    /// Les `limit` catégories les plus fréquentes ; à égalité, dans l'ordre des jours.
    pub fn most_frequent(&self, limit: usize) -> Vec<Conflict> {
        let mut all: Vec<&(u32, Conflict)> = self.0.values().collect();
        all.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        all.into_iter().take(limit).map(|(_, c)| c.clone()).collect()
    }
}

/// Compteurs partagés par les branches racines explorées en parallèle : budget de
/// nœuds commun et indice de la première branche ayant abouti.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shared<'p> {
    pub nodes: &'p AtomicU64,
    pub first_feasible: &'p AtomicUsize,
    pub branch: usize,
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Cell(usize),
    Day(usize),
}

/// Point de choix : une variable et les valeurs restant à essayer.
#[derive(Debug)]
struct Frame {
    cell: usize,
    values: Vec<ShiftCode>,
    next: usize,
    trail_len: usize,
}

/// Recherche avec propagation et retour arrière chronologique.
///
/// Une variable par (infirmière, jour), indexée `n * days + d` ; un domaine réduit à
/// une valeur vaut affectation. Le `trail` mémorise les anciens domaines pour défaire.
#[derive(Debug, Clone)]
pub(crate) struct Search<'p> {
    problem: &'p Problem,
    config: SolverConfig,
    cancel: CancelFlag,
    rest: RestTable,
    days: usize,
    domains: Vec<Domain>,
    trail: Vec<(usize, Domain)>,
    queue: VecDeque<Task>,
    queued_cells: Vec<bool>,
    queued_days: Vec<bool>,
    tally: Tally,
    nodes: u64,
    backtracks: u64,
    pinned: Option<(usize, ShiftCode)>,
    shared: Option<Shared<'p>>,
}

impl<'p> Search<'p> {
    pub fn new(problem: &'p Problem, config: SolverConfig, cancel: CancelFlag) -> Self {
        let days = problem.days();
        let cells = problem.nurse_count() * days;
        Self {
            problem,
            config,
            cancel,
            rest: RestTable::new(),
            days,
            domains: vec![Domain::FULL; cells],
            trail: Vec::new(),
            queue: VecDeque::new(),
            queued_cells: vec![false; cells],
            queued_days: vec![false; days],
            tally: Tally::default(),
            nodes: 0,
            backtracks: 0,
            pinned: None,
            shared: None,
        }
    }

    /// Fixe une valeur après la propagation racine (répartition entre workers).
    pub fn pin(mut self, cell: usize, code: ShiftCode) -> Self {
        self.pinned = Some((cell, code));
        self
    }

    /// Rattache la recherche à une répartition parallèle.
    pub fn share(mut self, shared: Shared<'p>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Propagation racine seule ; `Err` si l'instance est infaisable d'emblée.
    pub fn root(&mut self) -> Result<(), Conflict> {
        self.init();
        let result = self.propagate();
        if result.is_err() {
            self.clear_queue();
        }
        result
    }

    /// Variable de branchement racine et ses valeurs ordonnées.
    pub fn root_choice(&self) -> Option<(usize, Vec<ShiftCode>)> {
        self.select().map(|cell| (cell, self.order_values(cell)))
    }

    pub fn solve(&mut self) -> SearchReport {
        let mut phase = Phase::Init;
        let mut stack: Vec<Frame> = Vec::new();
        let mut root_failure: Option<Conflict> = None;
        let mut pinned = false;

        loop {
            trace!(?phase, nodes = self.nodes, depth = stack.len(), "search step");
            phase = match phase {
                Phase::Init => {
                    self.init();
                    Phase::Propagate
                }
                Phase::Propagate => match self.propagate() {
                    Ok(()) => match self.pinned.take() {
                        Some(_) if !self.take_node() => Phase::Timeout,
                        Some((cell, code)) => {
                            pinned = true;
                            match self.narrow(cell, Domain::single(code), ConflictKind::FixedCoverage) {
                                Ok(_) => Phase::Propagate,
                                Err(conflict) => {
                                    self.record(conflict);
                                    Phase::Infeasible
                                }
                            }
                        }
                        None => Phase::Branch,
                    },
                    Err(conflict) => {
                        self.clear_queue();
                        self.record(conflict.clone());
                        if stack.is_empty() && !pinned {
                            root_failure = Some(conflict);
                            Phase::Infeasible
                        } else {
                            Phase::Backtrack
                        }
                    }
                },
                Phase::Branch => {
                    if self.out_of_budget() {
                        Phase::Timeout
                    } else {
                        match self.select() {
                            None => Phase::Solution,
                            Some(cell) => {
                                let values = self.order_values(cell);
                                stack.push(Frame {
                                    cell,
                                    values,
                                    next: 0,
                                    trail_len: self.trail.len(),
                                });
                                self.advance(&mut stack)
                            }
                        }
                    }
                }
                Phase::Backtrack => self.advance(&mut stack),
                Phase::Solution => {
                    debug!(nodes = self.nodes, backtracks = self.backtracks, "feasible assignment found");
                    return self.report(Found::Feasible(self.extract()));
                }
                Phase::Infeasible => {
                    let unmet = match root_failure.take() {
                        Some(conflict) => {
                            let diagnosed = diagnose(self.problem);
                            if diagnosed.is_empty() {
                                vec![conflict]
                            } else {
                                diagnosed
                            }
                        }
                        None => self.tally.most_frequent(UNMET_LIMIT),
                    };
                    debug!(nodes = self.nodes, unmet = unmet.len(), "search tree exhausted");
                    return self.report(Found::Infeasible(unmet));
                }
                Phase::Timeout => {
                    debug!(nodes = self.nodes, "search budget exhausted");
                    return self.report(Found::Timeout);
                }
            };
        }
    }

    fn report(&mut self, found: Found) -> SearchReport {
        SearchReport {
            found,
            nodes: self.nodes,
            backtracks: self.backtracks,
            tally: std::mem::take(&mut self.tally),
        }
    }

    fn out_of_budget(&self) -> bool {
        let spent = self
            .shared
            .map_or(self.nodes, |s| s.nodes.load(Ordering::Acquire));
        spent >= self.config.node_budget || self.cancel.is_cancelled() || self.superseded()
    }

    /// Une branche racine d'indice inférieur a déjà abouti.
    fn superseded(&self) -> bool {
        self.shared
            .is_some_and(|s| s.first_feasible.load(Ordering::Acquire) < s.branch)
    }

    /// Réserve un nœud sur le budget (commun aux branches en parallèle).
    fn take_node(&mut self) -> bool {
        let budget = self.config.node_budget;
        let granted = match self.shared {
            Some(s) => s
                .nodes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < budget).then_some(n + 1))
                .is_ok(),
            None => self.nodes < budget,
        };
        if granted {
            self.nodes += 1;
        }
        granted
    }

    fn init(&mut self) {
        self.trail.clear();
        self.clear_queue();
        for n in 0..self.problem.nurse_count() {
            for d in 0..self.days {
                let idx = n * self.days + d;
                self.domains[idx] = self.problem.initial_domain(n, d);
                self.enqueue(idx);
            }
        }
    }

    /// Défait jusqu'au point de choix courant puis essaie sa valeur suivante.
    fn advance(&mut self, stack: &mut Vec<Frame>) -> Phase {
        loop {
            if self.out_of_budget() {
                return Phase::Timeout;
            }
            let Some(frame) = stack.last_mut() else {
                return Phase::Infeasible;
            };
            self.undo_to(frame.trail_len);
            if frame.next >= frame.values.len() {
                stack.pop();
                self.backtracks += 1;
                continue;
            }
            let code = frame.values[frame.next];
            frame.next += 1;
            if !self.take_node() {
                return Phase::Timeout;
            }
            match self.narrow(frame.cell, Domain::single(code), ConflictKind::FixedCoverage) {
                Ok(_) => return Phase::Propagate,
                Err(conflict) => self.record(conflict),
            }
        }
    }

    fn undo_to(&mut self, len: usize) {
        while self.trail.len() > len {
            if let Some((idx, old)) = self.trail.pop() {
                self.domains[idx] = old;
            }
        }
        self.clear_queue();
    }

    fn clear_queue(&mut self) {
        for task in self.queue.drain(..) {
            match task {
                Task::Cell(idx) => self.queued_cells[idx] = false,
                Task::Day(d) => self.queued_days[d] = false,
            }
        }
    }

    fn enqueue(&mut self, idx: usize) {
        if !self.queued_cells[idx] {
            self.queued_cells[idx] = true;
            self.queue.push_back(Task::Cell(idx));
        }
        let d = idx % self.days;
        if !self.queued_days[d] {
            self.queued_days[d] = true;
            self.queue.push_back(Task::Day(d));
        }
    }

    fn record(&mut self, conflict: Conflict) {
        self.tally.record(conflict);
    }

    fn cell_conflict(&self, idx: usize, kind: ConflictKind) -> Conflict {
        let (n, d) = (idx / self.days, idx % self.days);
        Conflict::for_nurse(&self.problem.nurses()[n].id, d as u32 + 1, kind)
    }

    /// Restreint un domaine à `keep`. `Ok(true)` si le domaine a changé.
    fn narrow(&mut self, idx: usize, keep: Domain, kind: ConflictKind) -> Result<bool, Conflict> {
        let old = self.domains[idx];
        let new = old.and(keep);
        if new == old {
            return Ok(false);
        }
        if new.is_empty() {
            return Err(self.cell_conflict(idx, kind));
        }
        self.trail.push((idx, old));
        self.domains[idx] = new;
        self.enqueue(idx);
        Ok(true)
    }

    fn propagate(&mut self) -> Result<(), Conflict> {
        while let Some(task) = self.queue.pop_front() {
            match task {
                Task::Cell(idx) => {
                    self.queued_cells[idx] = false;
                    self.propagate_rest(idx)?;
                    self.propagate_run(idx)?;
                }
                Task::Day(d) => {
                    self.queued_days[d] = false;
                    self.propagate_staffing(d)?;
                    self.propagate_fixed(d)?;
                }
            }
        }
        Ok(())
    }

    fn propagate_rest(&mut self, idx: usize) -> Result<(), Conflict> {
        let d = idx % self.days;
        let dom = self.domains[idx];
        if d + 1 < self.days {
            self.narrow(idx + 1, self.rest.after(dom), ConflictKind::RestViolation)?;
        }
        if d > 0 {
            self.narrow(idx - 1, self.rest.before(dom), ConflictKind::RestViolation)?;
        }
        Ok(())
    }

    /// Six jours sûrement travaillés dans une fenêtre de sept imposent le repos au septième.
    fn propagate_run(&mut self, idx: usize) -> Result<(), Conflict> {
        let window = MAX_CONSECUTIVE_WORKDAYS + 1;
        if self.days < window {
            return Ok(());
        }
        let (base, d) = (idx - idx % self.days, idx % self.days);
        let first = d.saturating_sub(MAX_CONSECUTIVE_WORKDAYS);
        let last = d.min(self.days - window);
        for start in first..=last {
            let mut working = 0;
            let mut open = None;
            for i in start..start + window {
                if self.domains[base + i].surely_working() {
                    working += 1;
                } else {
                    open = Some(i);
                }
            }
            match (working, open) {
                (w, _) if w == window => {
                    return Err(self.cell_conflict(
                        base + start + MAX_CONSECUTIVE_WORKDAYS,
                        ConflictKind::ConsecutiveDays,
                    ));
                }
                (w, Some(i)) if w == MAX_CONSECUTIVE_WORKDAYS => {
                    self.narrow(base + i, Domain::OFF, ConflictKind::ConsecutiveDays)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn slot_counts(&self, d: usize, unit: Unit, kind: ShiftKind) -> (u32, u32) {
        let mut certain = 0;
        let mut possible = 0;
        for n in 0..self.problem.nurse_count() {
            let dom = self.domains[n * self.days + d];
            let mask = self.problem.contributors(n, unit, kind);
            if dom.intersects(mask) {
                possible += 1;
                if dom.is_subset(mask) {
                    certain += 1;
                }
            }
        }
        (certain, possible)
    }

    /// Comptage exact des effectifs du jour `d`.
    fn propagate_staffing(&mut self, d: usize) -> Result<(), Conflict> {
        let nurses = self.problem.nurse_count();
        for unit in Unit::ALL {
            for kind in ShiftKind::ALL {
                let required = self.problem.required(unit, d, kind);
                let (certain, possible) = self.slot_counts(d, unit, kind);
                let day = d as u32 + 1;
                if certain > required {
                    return Err(Conflict::coverage(unit, kind, day, required, certain));
                }
                if possible < required {
                    return Err(Conflict::coverage(unit, kind, day, required, possible));
                }
                if possible == certain {
                    continue;
                }
                let full = certain == required;
                let tight = possible == required;
                if !full && !tight {
                    continue;
                }
                let cause = ConflictKind::Coverage {
                    unit,
                    kind,
                    required,
                    found: if full { certain + 1 } else { certain },
                };
                for n in 0..nurses {
                    let idx = n * self.days + d;
                    let dom = self.domains[idx];
                    let mask = self.problem.contributors(n, unit, kind);
                    if !dom.intersects(mask) || dom.is_subset(mask) {
                        continue;
                    }
                    let keep = if full { Domain::FULL.minus(mask) } else { mask };
                    self.narrow(idx, keep, cause)?;
                }
            }
        }
        self.propagate_headcount(d)
    }

    /// Principe des tiroirs : le déficit total ne peut dépasser les infirmières encore libres.
    fn propagate_headcount(&mut self, d: usize) -> Result<(), Conflict> {
        let mut deficit = 0;
        let mut worst: Option<(u32, Unit, ShiftKind, u32, u32)> = None;
        for unit in Unit::ALL {
            for kind in ShiftKind::ALL {
                let required = self.problem.required(unit, d, kind);
                let (certain, _) = self.slot_counts(d, unit, kind);
                let gap = required.saturating_sub(certain);
                deficit += gap;
                if gap > 0 && worst.map_or(true, |w| gap > w.0) {
                    worst = Some((gap, unit, kind, required, certain));
                }
            }
        }
        if deficit == 0 {
            return Ok(());
        }

        let free: Vec<usize> = (0..self.problem.nurse_count())
            .map(|n| n * self.days + d)
            .filter(|&idx| {
                let dom = self.domains[idx];
                dom.intersects(Domain::WORKING) && !self.committed(idx, dom)
            })
            .collect();
        let available = free.len() as u32;
        let (_, unit, kind, required, certain) = worst.unwrap_or((0, Unit::E9, ShiftKind::Day, 0, 0));
        if deficit > available {
            return Err(Conflict::coverage(unit, kind, d as u32 + 1, required, certain));
        }
        if deficit == available {
            let cause = ConflictKind::Coverage {
                unit,
                kind,
                required,
                found: certain,
            };
            for idx in free {
                self.narrow(idx, Domain::WORKING, cause)?;
            }
        }
        Ok(())
    }

    /// Domaine entièrement inclus dans un seul besoin (déjà compté comme certain).
    fn committed(&self, idx: usize, dom: Domain) -> bool {
        let n = idx / self.days;
        let unit = self.problem.nurses()[n].unit;
        let mut slots = dom.iter().map(|c| c.counts_toward(unit));
        match slots.next() {
            Some(Some(first)) => slots.all(|s| s == Some(first)),
            _ => false,
        }
    }

    /// `F` n'est permis que si aucun titulaire libre ne travaille ce jour-là.
    fn propagate_fixed(&mut self, d: usize) -> Result<(), Conflict> {
        let nurses = self.problem.nurse_count();
        let free_holder = |n: usize| self.problem.is_holder(n) && self.problem.request(n, d).is_none();

        let holder_on_duty = (0..nurses)
            .any(|n| free_holder(n) && self.domains[n * self.days + d].surely_working());
        let f_certain = (0..nurses).any(|n| self.domains[n * self.days + d] == Domain::single(ShiftCode::F));

        if holder_on_duty {
            for n in 0..nurses {
                let idx = n * self.days + d;
                let keep = Domain::FULL.without(ShiftCode::F);
                self.narrow(idx, keep, ConflictKind::FixedCoverage)?;
            }
        } else if f_certain {
            let holders: Vec<usize> = (0..nurses)
                .filter(|&n| self.problem.is_holder(n) && self.problem.request(n, d).is_none())
                .collect();
            for n in holders {
                self.narrow(n * self.days + d, Domain::OFF, ConflictKind::FixedCoverage)?;
            }
        }
        Ok(())
    }

    fn run_len(&self, n: usize, d: usize) -> usize {
        (0..d)
            .rev()
            .take_while(|&i| self.domains[n * self.days + i].surely_working())
            .count()
    }

    fn offs_before(&self, n: usize, d: usize) -> usize {
        (0..d)
            .filter(|&i| self.domains[n * self.days + i].value() == Some(ShiftCode::Off))
            .count()
    }

    /// Plus petit domaine du premier jour incomplet ; à égalité, la série la plus courte
    /// puis le plus de repos déjà pris.
    fn select(&self) -> Option<usize> {
        for d in 0..self.days {
            let best = (0..self.problem.nurse_count())
                .filter(|&n| self.domains[n * self.days + d].len() > 1)
                .min_by_key(|&n| {
                    let dom = self.domains[n * self.days + d];
                    (dom.len(), self.run_len(n, d), Reverse(self.offs_before(n, d)), n)
                });
            if let Some(n) = best {
                return Some(n * self.days + d);
            }
        }
        None
    }

    /// Ordre d'essai des valeurs : besoins non couverts d'abord, poste majoritaire, unité
    /// d'origine, puis repos (en premier si l'infirmière enchaîne déjà trop de jours).
    fn order_values(&self, cell: usize) -> Vec<ShiftCode> {
        let (n, d) = (cell / self.days, cell % self.days);
        let dom = self.domains[cell];
        let nurse = &self.problem.nurses()[n];
        let wanted = nurse.major_shift.kind();

        let mut working: Vec<((bool, bool, bool, Reverse<u32>, usize), ShiftCode)> = dom
            .iter()
            .filter_map(|code| {
                let (unit, kind) = code.counts_toward(nurse.unit)?;
                let required = self.problem.required(unit, d, kind);
                let (certain, _) = self.slot_counts(d, unit, kind);
                let gap = required.saturating_sub(certain);
                Some(((gap == 0, kind != wanted, code.is_support(), Reverse(gap), code.index()), code))
            })
            .collect();
        working.sort_by_key(|(key, _)| *key);

        let mut values: Vec<ShiftCode> = working.into_iter().map(|(_, code)| code).collect();
        if dom.contains(ShiftCode::Off) {
            if self.run_len(n, d) >= self.config.tired_threshold {
                values.insert(0, ShiftCode::Off);
            } else {
                values.push(ShiftCode::Off);
            }
        }
        values
    }

    fn extract(&self) -> Grid {
        let mut grid = Grid::new(self.problem.nurse_count(), self.days);
        for (idx, dom) in self.domains.iter().enumerate() {
            grid.set(idx / self.days, idx % self.days, dom.value());
        }
        grid
    }
}

/// Diagnostic racine : besoins qu'aucune combinaison ne peut couvrir compte tenu des
/// seules demandes (infirmières capables de tenir chaque besoin, jour par jour).
pub(crate) fn diagnose(problem: &Problem) -> Vec<Conflict> {
    let mut out = Vec::new();
    for d in 0..problem.days() {
        for unit in Unit::ALL {
            for kind in ShiftKind::ALL {
                let required = problem.required(unit, d, kind);
                if required == 0 {
                    continue;
                }
                let able = (0..problem.nurse_count())
                    .filter(|&n| problem.initial_domain(n, d).intersects(problem.contributors(n, unit, kind)))
                    .count() as u32;
                if able < required {
                    out.push(Conflict::coverage(unit, kind, d as u32 + 1, required, able));
                }
            }
        }
    }
    out
}
