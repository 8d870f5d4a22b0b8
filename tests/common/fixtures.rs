//! Source fixtures written into a temporary workspace

use super::constants::*;
use song_master::config::{AppConfig, SourceSettings};
use song_master::master_store::SCHEMA_VERSION;
use song_master::validation::MissingPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn title_js(with_gamma: bool) -> String {
    let gamma = if with_gamma {
        format!(",\n'gam':[3,\"{}\",\"\",\"EUROBEAT\",\"Gamma Artist\",\"Gamma Song\"]", SONG_GAMMA_ID)
    } else {
        String::new()
    };
    format!(
        "SS=35;\ntitletbl={{\n'alp':[SS,\"{}\",\"\",\"TRANCE\",\"Alpha Artist\",\"Alpha Song\"],\n'bet':[2,\"{}\",\"\",\"\",\"Beta Artist\",\"Beta Song\"],\n'unp':[4,\"{}\",\"\",\"POP\",\"Nobody\",\"Unplayable\"]{}\n}};\n",
        SONG_ALPHA_ID, SONG_BETA_ID, SONG_UNPLAYABLE_ID, gamma
    )
}

pub const DATA_JS: &str = "datatbl={'alp':[0,150],'bet':[0,140],'gam':[0,160]};\n";

/// Alpha: SP N/H/A and DP H/A. Beta: SP N/H. Gamma: SP H.
pub fn act_js(alpha_another: &str) -> String {
    format!(
        "actbl={{\n'alp':[3, 0,0, 5,0, 9,0, {},0, 0,0, 0,0, 0,0, 10,0, 12,0, 0,0],\n'bet':[3, 0,0, 3,0, 7,0],\n'gam':[3, 0,0, 0,0, 8,0],\n'unp':[3, 0,0, 0,0, 0,0]\n}};\n",
        alpha_another
    )
}

/// A temporary workspace with a script directory and an output directory.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("scripts")).unwrap();
        Workspace { dir }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write the three scripts. `with_gamma` keeps the song dropped by the
    /// second build; `alpha_another` is the SP ANOTHER level cell of Alpha.
    pub fn write_scripts(&self, with_gamma: bool, alpha_another: &str) {
        let scripts = self.scripts_dir();
        fs::write(scripts.join("titletbl.js"), title_js(with_gamma)).unwrap();
        fs::write(scripts.join("datatbl.js"), DATA_JS).unwrap();
        fs::write(scripts.join("actbl.js"), act_js(alpha_another)).unwrap();
    }

    pub fn config(&self, out: &str) -> AppConfig {
        AppConfig {
            db_path: self.path(out).join("song_master.sqlite"),
            manifest_path: self.path(out).join("latest.json"),
            schema_version: SCHEMA_VERSION.to_string(),
            baseline_db: None,
            missing_policy: MissingPolicy::Error,
            skip_unchanged: false,
            source: SourceSettings::Textage {
                dir: self.scripts_dir(),
            },
        }
    }
}

pub fn chart_ids(db_path: &Path) -> Vec<(String, String, String, i64, bool)> {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT m.source_id, c.play_style, c.difficulty, c.chart_id, c.is_active
             FROM chart c JOIN music m ON m.music_id = c.music_id
             ORDER BY m.source_id, c.play_style, c.difficulty",
        )
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get::<_, i64>(4)? != 0,
            ))
        })
        .unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}
