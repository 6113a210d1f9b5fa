//! The injected snapshot-writer capability.
//!
//! Writer failures are never fatal to an iteration loop: callers log them
//! and continue. Overwrite-vs-append policy is the writer's business; the
//! methods only distinguish the archive stream from the per-step single
//! snapshot via [`SnapshotKind`].

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Appended trajectory archive.
    Archive,
    /// Latest-state snapshot, overwritten every step.
    Single,
}

pub trait TrajectoryWriter {
    fn append_configuration(
        &mut self,
        image: usize,
        iteration: u64,
        kind: SnapshotKind,
        spins: &[Vector3<f64>],
    ) -> io::Result<()>;

    fn write_energy_header(&mut self, image: usize) -> io::Result<()>;

    fn append_energy(
        &mut self,
        image: usize,
        iteration: u64,
        reaction_coordinate: f64,
        energy: f64,
    ) -> io::Result<()>;
}

/// Discards everything. Useful for tests and static evaluation runs.
#[derive(Debug, Default)]
pub struct NullWriter;

impl TrajectoryWriter for NullWriter {
    fn append_configuration(
        &mut self,
        _image: usize,
        _iteration: u64,
        _kind: SnapshotKind,
        _spins: &[Vector3<f64>],
    ) -> io::Result<()> {
        Ok(())
    }

    fn write_energy_header(&mut self, _image: usize) -> io::Result<()> {
        Ok(())
    }

    fn append_energy(
        &mut self,
        _image: usize,
        _iteration: u64,
        _reaction_coordinate: f64,
        _energy: f64,
    ) -> io::Result<()> {
        Ok(())
    }
}

/// Plain-text writer placing one file per stream under an output folder:
/// `spins_<image>_archive.txt`, `spins_<image>_single.txt`,
/// `energy_<image>.txt`.
#[derive(Debug)]
pub struct FileTrajectoryWriter {
    folder: PathBuf,
}

impl FileTrajectoryWriter {
    pub fn new(folder: impl Into<PathBuf>) -> io::Result<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }

    fn archive_path(&self, image: usize) -> PathBuf {
        self.folder.join(format!("spins_{image:02}_archive.txt"))
    }

    fn single_path(&self, image: usize) -> PathBuf {
        self.folder.join(format!("spins_{image:02}_single.txt"))
    }

    fn energy_path(&self, image: usize) -> PathBuf {
        self.folder.join(format!("energy_{image:02}.txt"))
    }

    fn write_spins(file: &mut File, iteration: u64, spins: &[Vector3<f64>]) -> io::Result<()> {
        writeln!(file, "# iteration {iteration}")?;
        for s in spins {
            writeln!(file, "{:.12e} {:.12e} {:.12e}", s.x, s.y, s.z)?;
        }
        Ok(())
    }
}

impl TrajectoryWriter for FileTrajectoryWriter {
    fn append_configuration(
        &mut self,
        image: usize,
        iteration: u64,
        kind: SnapshotKind,
        spins: &[Vector3<f64>],
    ) -> io::Result<()> {
        let mut file = match kind {
            SnapshotKind::Archive => OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.archive_path(image))?,
            SnapshotKind::Single => File::create(self.single_path(image))?,
        };
        Self::write_spins(&mut file, iteration, spins)
    }

    fn write_energy_header(&mut self, image: usize) -> io::Result<()> {
        let path = self.energy_path(image);
        // Header-once semantics: an existing file already carries one.
        if Path::new(&path).exists() {
            return Ok(());
        }
        let mut file = File::create(path)?;
        writeln!(file, "# iteration  reaction_coordinate  energy[meV]")?;
        Ok(())
    }

    fn append_energy(
        &mut self,
        image: usize,
        iteration: u64,
        reaction_coordinate: f64,
        energy: f64,
    ) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.energy_path(image))?;
        writeln!(file, "{iteration} {reaction_coordinate:.12e} {energy:.12e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_appends_archive_and_overwrites_single() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileTrajectoryWriter::new(dir.path()).unwrap();
        let spins = vec![Vector3::new(0.0, 0.0, 1.0)];

        writer
            .append_configuration(0, 0, SnapshotKind::Archive, &spins)
            .unwrap();
        writer
            .append_configuration(0, 1, SnapshotKind::Archive, &spins)
            .unwrap();
        writer
            .append_configuration(0, 0, SnapshotKind::Single, &spins)
            .unwrap();
        writer
            .append_configuration(0, 1, SnapshotKind::Single, &spins)
            .unwrap();

        let archive =
            std::fs::read_to_string(dir.path().join("spins_00_archive.txt")).unwrap();
        assert_eq!(archive.matches("# iteration").count(), 2);
        let single = std::fs::read_to_string(dir.path().join("spins_00_single.txt")).unwrap();
        assert_eq!(single.matches("# iteration").count(), 1);
        assert!(single.contains("# iteration 1"));
    }

    #[test]
    fn energy_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileTrajectoryWriter::new(dir.path()).unwrap();

        writer.write_energy_header(0).unwrap();
        writer.append_energy(0, 0, 0.0, -1.5).unwrap();
        writer.write_energy_header(0).unwrap();
        writer.append_energy(0, 1, 0.0, -1.6).unwrap();

        let text = std::fs::read_to_string(dir.path().join("energy_00.txt")).unwrap();
        assert_eq!(text.matches('#').count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
