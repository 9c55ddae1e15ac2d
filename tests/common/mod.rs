#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// A one-entry reference mapping in the upstream JSON shape: Gia Lâm's
/// Yên Viên commune keeps its name under the current scheme.
pub fn reference_json() -> &'static str {
    r#"[
  {
    "Mã I (CŨ)": 1,
    "Mã II (CŨ)": 18,
    "Mã III (CŨ)": 577,
    "Tỉnh (CŨ)": "Thành phố Hà Nội",
    "Huyện (CŨ)": "Huyện Gia Lâm",
    "Xã (CŨ)": "Xã Yên Viên",
    "Tỉnh": "Thành phố Hà Nội",
    "Xã": "Xã Yên Viên",
    "Mã I": "01",
    "Mã III": "00577"
  }
]"#
}

/// Address group file matching the `tinh`/`huyen`/`xa` fixture headers.
pub fn groups_json() -> &'static str {
    r#"[
  {
    "province": "tinh",
    "district": "huyen",
    "ward": "xa"
  }
]"#
}

/// Three-row fixture: two rows resolve through the reference, one does not.
pub fn input_csv() -> &'static str {
    "tinh,huyen,xa\n\
     Thành phố Hà Nội,Huyện Gia Lâm,Xã Yên Viên\n\
     Nơi khác,Không rõ,Không rõ\n\
     tp. hà nội,gia lâm,yên viên\n"
}
