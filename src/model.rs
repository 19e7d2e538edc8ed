use crate::scheduler::RosterError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifiant fort pour Nurse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NurseId(String);

impl NurseId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NurseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Les deux unités coopérantes. Toute infirmière appartient à une seule unité.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "9E")]
    E9,
    #[serde(rename = "10E")]
    E10,
}

impl Unit {
    pub const ALL: [Unit; 2] = [Unit::E9, Unit::E10];

    /// L'unité soutenue lors d'un poste « support ».
    pub fn other(self) -> Unit {
        match self {
            Unit::E9 => Unit::E10,
            Unit::E10 => Unit::E9,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Unit::E9 => 0,
            Unit::E10 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::E9 => "9E",
            Unit::E10 => "10E",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "9E" => Ok(Unit::E9),
            "10E" => Ok(Unit::E10),
            other => Err(RosterError::InvalidInput(format!("unknown unit: {other:?}"))),
        }
    }
}

/// Famille de poste, au sens des besoins en effectif.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftKind {
    Day,
    Evening,
    Night,
    /// Créneau C/F, toujours compté pour la 9E.
    FixedC,
}

impl ShiftKind {
    pub const ALL: [ShiftKind; 4] = [
        ShiftKind::Day,
        ShiftKind::Evening,
        ShiftKind::Night,
        ShiftKind::FixedC,
    ];

    pub fn index(self) -> usize {
        match self {
            ShiftKind::Day => 0,
            ShiftKind::Evening => 1,
            ShiftKind::Night => 2,
            ShiftKind::FixedC => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShiftKind::Day => "Day",
            ShiftKind::Evening => "Evening",
            ShiftKind::Night => "Night",
            ShiftKind::FixedC => "FixedC",
        }
    }
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code de poste attribué à une infirmière pour une journée.
///
/// Les postes « 1 » (`A1`, `E1`, `N1`) sont effectués en support dans l'autre unité.
/// `C` et `F` sont toujours comptés pour la 9E, quelle que soit l'unité de l'infirmière.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftCode {
    A,
    A1,
    E,
    E1,
    N,
    N1,
    C,
    F,
    #[serde(rename = "OFF", alias = "Off", alias = "off")]
    Off,
}

impl ShiftCode {
    pub const ALL: [ShiftCode; 9] = [
        ShiftCode::A,
        ShiftCode::A1,
        ShiftCode::E,
        ShiftCode::E1,
        ShiftCode::N,
        ShiftCode::N1,
        ShiftCode::C,
        ShiftCode::F,
        ShiftCode::Off,
    ];

    pub fn index(self) -> usize {
        match self {
            ShiftCode::A => 0,
            ShiftCode::A1 => 1,
            ShiftCode::E => 2,
            ShiftCode::E1 => 3,
            ShiftCode::N => 4,
            ShiftCode::N1 => 5,
            ShiftCode::C => 6,
            ShiftCode::F => 7,
            ShiftCode::Off => 8,
        }
    }

    pub fn from_index(i: usize) -> Option<ShiftCode> {
        Self::ALL.get(i).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShiftCode::A => "A",
            ShiftCode::A1 => "A1",
            ShiftCode::E => "E",
            ShiftCode::E1 => "E1",
            ShiftCode::N => "N",
            ShiftCode::N1 => "N1",
            ShiftCode::C => "C",
            ShiftCode::F => "F",
            ShiftCode::Off => "OFF",
        }
    }

    pub fn is_off(self) -> bool {
        self == ShiftCode::Off
    }

    pub fn is_working(self) -> bool {
        !self.is_off()
    }

    pub fn is_support(self) -> bool {
        matches!(self, ShiftCode::A1 | ShiftCode::E1 | ShiftCode::N1 | ShiftCode::F)
    }

    /// Famille du poste (`None` pour un repos).
    pub fn kind(self) -> Option<ShiftKind> {
        match self {
            ShiftCode::A | ShiftCode::A1 => Some(ShiftKind::Day),
            ShiftCode::E | ShiftCode::E1 => Some(ShiftKind::Evening),
            ShiftCode::N | ShiftCode::N1 => Some(ShiftKind::Night),
            ShiftCode::C | ShiftCode::F => Some(ShiftKind::FixedC),
            ShiftCode::Off => None,
        }
    }

    /// Fenêtre horaire en heures `[début, fin)`, fin à 24 pour minuit.
    pub fn window(self) -> Option<(u8, u8)> {
        match self.kind()? {
            ShiftKind::Day => Some((8, 16)),
            ShiftKind::Evening => Some((16, 24)),
            ShiftKind::Night => Some((0, 8)),
            ShiftKind::FixedC => Some((14, 22)),
        }
    }

    /// Besoin `(unité, famille)` couvert par ce code pour une infirmière de `nurse_unit`.
    pub fn counts_toward(self, nurse_unit: Unit) -> Option<(Unit, ShiftKind)> {
        let unit = match self {
            ShiftCode::A | ShiftCode::E | ShiftCode::N => nurse_unit,
            ShiftCode::A1 | ShiftCode::E1 | ShiftCode::N1 => nurse_unit.other(),
            ShiftCode::C | ShiftCode::F => Unit::E9,
            ShiftCode::Off => return None,
        };
        self.kind().map(|kind| (unit, kind))
    }

    /// Inverse de [`ShiftCode::counts_toward`] : le code qu'une infirmière de `nurse_unit`
    /// doit porter pour couvrir `(unit, kind)`. `holder` choisit entre `C` et `F`.
    pub fn for_slot(unit: Unit, kind: ShiftKind, nurse_unit: Unit, holder: bool) -> Option<ShiftCode> {
        let home = unit == nurse_unit;
        match kind {
            ShiftKind::FixedC if unit != Unit::E9 => None,
            ShiftKind::FixedC if holder => Some(ShiftCode::C),
            ShiftKind::FixedC => Some(ShiftCode::F),
            ShiftKind::Day => Some(if home { ShiftCode::A } else { ShiftCode::A1 }),
            ShiftKind::Evening => Some(if home { ShiftCode::E } else { ShiftCode::E1 }),
            ShiftKind::Night => Some(if home { ShiftCode::N } else { ShiftCode::N1 }),
        }
    }
}

impl fmt::Display for ShiftCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftCode {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s.trim() {
            "A" => ShiftCode::A,
            "A1" => ShiftCode::A1,
            "E" => ShiftCode::E,
            "E1" => ShiftCode::E1,
            "N" => ShiftCode::N,
            "N1" => ShiftCode::N1,
            "C" => ShiftCode::C,
            "F" => ShiftCode::F,
            "OFF" | "Off" | "off" => ShiftCode::Off,
            other => {
                return Err(RosterError::InvalidInput(format!(
                    "unknown shift code: {other:?}"
                )))
            }
        };
        Ok(code)
    }
}

/// Repos minimal de 11 h : vrai si `next` ne peut pas suivre `prev` le lendemain.
pub fn rest_forbidden(prev: ShiftCode, next: ShiftCode) -> bool {
    match (prev.kind(), next.kind()) {
        (Some(ShiftKind::Evening), Some(ShiftKind::Day)) => true,
        (Some(ShiftKind::Night), Some(_)) => true,
        (Some(ShiftKind::FixedC), Some(ShiftKind::Day)) => true,
        _ => false,
    }
}

/// Poste majoritaire souhaité ; n'intervient que dans l'objectif souple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MajorShift {
    #[default]
    #[serde(rename = "A", alias = "Day")]
    Day,
    #[serde(rename = "E", alias = "Evening")]
    Evening,
    #[serde(rename = "N", alias = "Night")]
    Night,
    #[serde(rename = "C", alias = "FixedC")]
    FixedC,
    #[serde(rename = "F", alias = "FixedF")]
    FixedF,
}

impl MajorShift {
    pub fn kind(self) -> ShiftKind {
        match self {
            MajorShift::Day => ShiftKind::Day,
            MajorShift::Evening => ShiftKind::Evening,
            MajorShift::Night => ShiftKind::Night,
            MajorShift::FixedC | MajorShift::FixedF => ShiftKind::FixedC,
        }
    }
}

impl FromStr for MajorShift {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "Day" | "day" => Ok(MajorShift::Day),
            "E" | "Evening" | "evening" => Ok(MajorShift::Evening),
            "N" | "Night" | "night" => Ok(MajorShift::Night),
            "C" | "FixedC" => Ok(MajorShift::FixedC),
            "F" | "FixedF" => Ok(MajorShift::FixedF),
            other => Err(RosterError::InvalidInput(format!(
                "unknown major shift: {other:?}"
            ))),
        }
    }
}

/// Infirmière
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nurse {
    pub id: NurseId,
    #[serde(default)]
    pub name: String,
    pub unit: Unit,
    #[serde(default)]
    pub major_shift: MajorShift,
}

impl Nurse {
    pub fn new<S: AsRef<str>>(id: S, unit: Unit, major_shift: MajorShift) -> Self {
        Self {
            id: NurseId::new(&id),
            name: id.as_ref().to_owned(),
            unit,
            major_shift,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }
}

/// Demandes impératives : infirmière → jour du mois (1-indexé) → code imposé.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestMap(BTreeMap<NurseId, BTreeMap<u32, ShiftCode>>);

impl RequestMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, nurse: &NurseId, day: u32, code: ShiftCode) -> Option<ShiftCode> {
        self.0.entry(nurse.clone()).or_default().insert(day, code)
    }

    pub fn remove(&mut self, nurse: &NurseId, day: u32) -> Option<ShiftCode> {
        let days = self.0.get_mut(nurse)?;
        let prev = days.remove(&day);
        if days.is_empty() {
            self.0.remove(nurse);
        }
        prev
    }

    pub fn get(&self, nurse: &NurseId, day: u32) -> Option<ShiftCode> {
        self.0.get(nurse).and_then(|days| days.get(&day)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Parcourt `(infirmière, jour, code)` dans l'ordre des identifiants.
    pub fn iter(&self) -> impl Iterator<Item = (&NurseId, u32, ShiftCode)> + '_ {
        self.0
            .iter()
            .flat_map(|(id, days)| days.iter().map(move |(day, code)| (id, *day, *code)))
    }
}

/// Mois planifié (calendrier grégorien).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanningMonth {
    first: NaiveDate,
    days: u32,
}

impl PlanningMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, RosterError> {
        let invalid = || RosterError::InvalidInput(format!("invalid planning month {year}-{month}"));
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let next = NaiveDate::from_ymd_opt(ny, nm, 1).ok_or_else(invalid)?;
        let days = next.signed_duration_since(first).num_days() as u32;
        Ok(Self { first, days })
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    /// Nombre de jours du mois (28 à 31).
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Date du jour `day` (1-indexé), `None` hors du mois.
    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        if day == 0 || day > self.days {
            return None;
        }
        self.first.checked_add_days(Days::new(u64::from(day - 1)))
    }

    pub fn weekday(&self, day: u32) -> Option<Weekday> {
        self.date(day).map(|d| d.weekday())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }
}

/// Effectifs requis par unité, par jour et par famille de poste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffingRequirement {
    // [jour][unité][famille]
    counts: Vec<[[u32; 4]; 2]>,
}

impl StaffingRequirement {
    /// Aucun besoin, sur `days` jours.
    pub fn empty(days: u32) -> Self {
        Self {
            counts: vec![[[0; 4]; 2]; days as usize],
        }
    }

    pub fn days(&self) -> u32 {
        self.counts.len() as u32
    }

    pub fn get(&self, unit: Unit, day: u32, kind: ShiftKind) -> u32 {
        day.checked_sub(1)
            .and_then(|d| self.counts.get(d as usize))
            .map(|c| c[unit.index()][kind.index()])
            .unwrap_or(0)
    }

    pub fn set(&mut self, unit: Unit, day: u32, kind: ShiftKind, count: u32) {
        if let Some(c) = day.checked_sub(1).and_then(|d| self.counts.get_mut(d as usize)) {
            c[unit.index()][kind.index()] = count;
        }
    }

    /// Fixe la même valeur sur tous les jours.
    pub fn set_all(&mut self, unit: Unit, kind: ShiftKind, count: u32) {
        for c in &mut self.counts {
            c[unit.index()][kind.index()] = count;
        }
    }

    /// Total des postes à pourvoir un jour donné.
    pub fn total(&self, day: u32) -> u32 {
        Unit::ALL
            .iter()
            .flat_map(|u| ShiftKind::ALL.iter().map(move |k| (*u, *k)))
            .map(|(u, k)| self.get(u, day, k))
            .sum()
    }
}
