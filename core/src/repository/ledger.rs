use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::model::ledger::Ledger;
use crate::repository::traits::LedgerRepository;

const LEDGER_FILE_NAME: &str = "data.json";
const APP_DIR_NAME: &str = "mousetrack";

/// Platform data directory for the tracker, e.g. `~/.local/share/mousetrack`.
/// Falls back to `~/.mousetrack` when the platform has no data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_DIR_NAME));
    }
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home_dir.join(format!(".{}", APP_DIR_NAME)))
}

/// Ledger stored as a single pretty-printed JSON file.
#[derive(Clone, Debug)]
pub struct FileLedgerRepository {
    file_path: PathBuf,
}

impl FileLedgerRepository {
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let dir = match base_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        Ok(FileLedgerRepository {
            file_path: dir.join(LEDGER_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn temp_path(&self) -> PathBuf {
        self.file_path.with_extension("json.tmp")
    }
}

impl LedgerRepository for FileLedgerRepository {
    /// Missing or malformed files load as an empty ledger. Any other read
    /// error is returned, so the caller never overwrites a ledger it could
    /// not read.
    fn load(&self) -> Result<Ledger> {
        let file = match File::open(&self.file_path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(
                    "No ledger at {}, starting with an empty one",
                    self.file_path.display()
                );
                return Ok(Ledger::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to open ledger {}", self.file_path.display())
                })
            }
        };

        match serde_json::from_reader::<_, Ledger>(BufReader::new(file)) {
            Ok(ledger) => Ok(ledger),
            Err(err) if err.is_io() => Err(err)
                .with_context(|| format!("Failed to read ledger {}", self.file_path.display())),
            Err(err) => {
                warn!(
                    "Ledger {} is malformed ({}), treating it as empty",
                    self.file_path.display(),
                    err
                );
                Ok(Ledger::new())
            }
        }
    }

    /// Rewrites the whole file: serialize to a sibling temp file, then
    /// rename it over the ledger.
    fn save(&self, ledger: &Ledger) -> Result<()> {
        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            let mut writer = BufWriter::new(file);
            let mut serializer =
                Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
            ledger.serialize(&mut serializer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&temp_path, &self.file_path).with_context(|| {
            format!(
                "Failed to replace ledger {} with {}",
                self.file_path.display(),
                temp_path.display()
            )
        })?;
        Ok(())
    }
}
