use crate::model::{Nurse, RequestMap};
use crate::roster::Roster;
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Source des données d'entrée d'une génération.
pub trait StaffSource {
    fn load_nurses(&self) -> anyhow::Result<Vec<Nurse>>;
    /// Demandes du mois ; aucune demande enregistrée donne une table vide.
    fn load_requests(&self, year: i32, month: u32) -> anyhow::Result<RequestMap>;
}

/// Destination des plannings produits.
pub trait RosterSink {
    /// Sauvegarde de manière atomique.
    fn save_roster(&self, roster: &Roster) -> anyhow::Result<PathBuf>;
}

/// Répertoire de fichiers JSON : `nurses.json`, `requests-YYYY-MM.json`,
/// `roster-YYYY-MM.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating store {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn nurses_path(&self) -> PathBuf {
        self.dir.join("nurses.json")
    }

    pub fn requests_path(&self, year: i32, month: u32) -> PathBuf {
        self.dir.join(format!("requests-{year}-{month:02}.json"))
    }

    pub fn roster_path(&self, year: i32, month: u32) -> PathBuf {
        self.dir.join(format!("roster-{year}-{month:02}.json"))
    }

    pub fn save_nurses(&self, nurses: &[Nurse]) -> anyhow::Result<()> {
        write_atomic(&self.nurses_path(), nurses)
    }

    pub fn save_requests(&self, year: i32, month: u32, requests: &RequestMap) -> anyhow::Result<()> {
        write_atomic(&self.requests_path(year, month), requests)
    }

    pub fn load_roster(&self, year: i32, month: u32) -> anyhow::Result<Roster> {
        crate::io::import_roster_json(self.roster_path(year, month))
    }
}

impl StaffSource for JsonStore {
    fn load_nurses(&self) -> anyhow::Result<Vec<Nurse>> {
        crate::io::import_nurses_json(self.nurses_path())
    }

    fn load_requests(&self, year: i32, month: u32) -> anyhow::Result<RequestMap> {
        let path = self.requests_path(year, month);
        if !path.exists() {
            return Ok(RequestMap::new());
        }
        crate::io::import_requests_json(path)
    }
}

impl RosterSink for JsonStore {
    fn save_roster(&self, roster: &Roster) -> anyhow::Result<PathBuf> {
        let path = self.roster_path(roster.year(), roster.month());
        write_atomic(&path, roster)?;
        Ok(path)
    }
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))
        .with_context(|| "creating temp file")?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("atomic rename to {}", path.display()))?;
    Ok(())
}
