use crate::model::{MajorShift, Nurse, NurseId, RequestMap, Unit};
use crate::roster::Roster;
use anyhow::{bail, Context};
use csv::ReaderBuilder;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Import d'infirmières depuis CSV: header `id,name,unit,major_shift`.
/// Un id vide reçoit un UUID ; un nom vide reprend l'id ; `major_shift` vide vaut `A`.
pub fn import_nurses_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Nurse>> {
    let file = fs::File::open(&path)
        .with_context(|| format!("opening {}", path.as_ref().display()))?;
    read_nurses_csv(file)
}

pub fn read_nurses_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Nurse>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let row = line + 2;
        let id = rec.get(0).context("missing id")?;
        let name = rec.get(1).unwrap_or("");
        let unit: Unit = rec
            .get(2)
            .context("missing unit")?
            .parse()
            .with_context(|| format!("row {row}: invalid unit"))?;
        let major = match rec.get(3).unwrap_or("") {
            "" => MajorShift::default(),
            raw => raw
                .parse()
                .with_context(|| format!("row {row}: invalid major_shift"))?,
        };
        let id = if id.is_empty() {
            NurseId::random()
        } else {
            NurseId::new(id)
        };
        let name = if name.is_empty() {
            id.as_str().to_owned()
        } else {
            name.to_owned()
        };
        out.push(Nurse {
            id,
            name,
            unit,
            major_shift: major,
        });
    }
    if out.is_empty() {
        bail!("nurse file contains no rows");
    }
    Ok(out)
}

/// Import JSON: tableau de `{ id, name?, unit, majorShift? }`.
pub fn import_nurses_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Nurse>> {
    let data = fs::read(&path).with_context(|| format!("reading {}", path.as_ref().display()))?;
    parse_nurses_json(&data).with_context(|| format!("parsing {}", path.as_ref().display()))
}

pub fn parse_nurses_json(data: &[u8]) -> anyhow::Result<Vec<Nurse>> {
    let mut nurses: Vec<Nurse> = serde_json::from_slice(data)?;
    for nurse in &mut nurses {
        if nurse.name.trim().is_empty() {
            nurse.name = nurse.id.as_str().to_owned();
        }
    }
    Ok(nurses)
}

/// Import JSON des demandes: `{ "<nurseId>": { "<jour>": "OFF" | "<code>" } }`.
pub fn import_requests_json<P: AsRef<Path>>(path: P) -> anyhow::Result<RequestMap> {
    let data = fs::read(&path).with_context(|| format!("reading {}", path.as_ref().display()))?;
    let requests: RequestMap = serde_json::from_slice(&data)
        .with_context(|| format!("parsing {}", path.as_ref().display()))?;
    Ok(requests)
}

/// Export JSON du roster (jolie mise en forme)
pub fn export_roster_json<P: AsRef<Path>>(path: P, roster: &Roster) -> anyhow::Result<()> {
    let s = roster.to_json()?;
    fs::write(&path, s).with_context(|| format!("writing {}", path.as_ref().display()))?;
    Ok(())
}

pub fn import_roster_json<P: AsRef<Path>>(path: P) -> anyhow::Result<Roster> {
    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.as_ref().display()))?;
    Roster::from_json(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_fill_defaults() {
        let data = "id,name,unit,major_shift\n\
                    n1,Alice,9E,E\n\
                    ,Bea,10E,\n\
                    n3,,9E,C\n";
        let nurses = read_nurses_csv(data.as_bytes()).unwrap();
        assert_eq!(nurses.len(), 3);
        assert_eq!(nurses[0].major_shift, MajorShift::Evening);
        assert_eq!(nurses[1].unit, Unit::E10);
        assert_eq!(nurses[1].major_shift, MajorShift::Day);
        assert_eq!(nurses[1].id.as_str().len(), 36);
        assert_eq!(nurses[2].name, "n3");
        assert_eq!(nurses[2].major_shift, MajorShift::FixedC);
    }

    #[test]
    fn csv_rejects_unknown_unit() {
        let err = read_nurses_csv("id,name,unit,major_shift\nn1,A,11E,A\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("row 2: invalid unit"));
    }

    #[test]
    fn json_names_default_to_id() {
        let nurses =
            parse_nurses_json(br#"[{"id":"x","unit":"9E","majorShift":"N"},{"id":"y","name":"Yve","unit":"10E"}]"#)
                .unwrap();
        assert_eq!(nurses[0].name, "x");
        assert_eq!(nurses[0].major_shift, MajorShift::Night);
        assert_eq!(nurses[1].name, "Yve");
    }
}
