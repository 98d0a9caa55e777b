//! Чтение и атомарная запись файла проекта

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::{Result, SyncError};
use crate::project::{ProjectFile, PROJECT_VERSION};
use crate::segment::{validate_order, Segment};

/// Формы файла на диске: текущая или старый массив сегментов
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredProject {
    Current(ProjectFile),
    Legacy(Vec<Segment>),
}

fn video_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_stored(path: &Path) -> Result<StoredProject> {
    if !path.exists() {
        return Err(SyncError::FileNotFound(format!(
            "Project file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str::<StoredProject>(&content).map_err(|e| {
        SyncError::InvalidProject(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Прочитать проект; старый формат обновляется в памяти
pub fn load_project<P: AsRef<Path>>(path: P) -> Result<ProjectFile> {
    let path = path.as_ref();

    let project = match read_stored(path)? {
        StoredProject::Current(project) => {
            if project.version > PROJECT_VERSION {
                warn!(
                    "Project {} has version {}, newer than supported {}",
                    path.display(),
                    project.version,
                    PROJECT_VERSION
                );
            }
            project
        }
        StoredProject::Legacy(segments) => {
            info!(
                "Upgrading legacy project {} ({} segments)",
                path.display(),
                segments.len()
            );
            ProjectFile::new(video_name_from_path(path), segments)
        }
    };

    validate_order(&project.segments)?;
    debug!(
        "Loaded project {} rev {} with {} segments",
        project.video_name,
        project.revision,
        project.segments.len()
    );
    Ok(project)
}

fn write_atomic(path: &Path, project: &ProjectFile) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, project)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| SyncError::Io(e.error))?;
    Ok(())
}

/// Записать проект без проверки ревизии
pub fn save_project<P: AsRef<Path>>(path: P, project: &mut ProjectFile) -> Result<()> {
    project.last_modified = Utc::now();
    write_atomic(path.as_ref(), project)?;
    debug!("Saved project to {}", path.as_ref().display());
    Ok(())
}

/// Записать проект, если файл на диске не менялся с момента чтения
///
/// Ревизия на диске сравнивается с `project.revision`; при совпадении
/// записывается `revision + 1`. При конфликте проект в памяти не меняется.
pub fn save_project_checked<P: AsRef<Path>>(path: P, project: &mut ProjectFile) -> Result<()> {
    let path = path.as_ref();

    let found = if path.exists() {
        match read_stored(path)? {
            StoredProject::Current(on_disk) => on_disk.revision,
            StoredProject::Legacy(_) => 0,
        }
    } else {
        project.revision
    };

    if found != project.revision {
        warn!(
            "Project {} was modified concurrently: expected rev {}, found {}",
            path.display(),
            project.revision,
            found
        );
        return Err(SyncError::ProjectConflict {
            expected: project.revision,
            found,
        });
    }

    let mut next = project.clone();
    next.revision += 1;
    next.version = PROJECT_VERSION;
    next.last_modified = Utc::now();
    write_atomic(path, &next)?;
    *project = next;

    debug!("Saved project {} rev {}", path.display(), project.revision);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Strategy;
    use tempfile::tempdir;

    const LEGACY: &str = r#"[
        {"startTime": 0, "content": "First line", "strategy": "trim"},
        {"startTime": 4.5, "content": "第二句", "strategy": "speed_overflow", "speedFactor": 3,
         "audioDuration": 2.25, "audioOverride": {"muteOriginal": true}}
    ]"#;

    #[test]
    fn test_legacy_upgrade_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lecture.json");
        fs::write(&path, LEGACY).unwrap();

        let mut upgraded = load_project(&path).unwrap();
        assert_eq!(upgraded.version, PROJECT_VERSION);
        assert_eq!(upgraded.video_name, "lecture");
        assert_eq!(upgraded.segments.len(), 2);
        assert_eq!(upgraded.segments[1].strategy, Strategy::SpeedOverflow);

        save_project_checked(&path, &mut upgraded).unwrap();
        let reread = load_project(&path).unwrap();
        assert_eq!(reread.segments, upgraded.segments);
        assert_eq!(reread.revision, 1);

        let legacy: Vec<Segment> = serde_json::from_str(LEGACY).unwrap();
        assert_eq!(reread.segments, legacy);
    }

    #[test]
    fn test_concurrent_writer_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        let mut project = ProjectFile::new("video.mp4", vec![Segment::new(0.0, "hello")]);
        save_project_checked(&path, &mut project).unwrap();

        let mut first = load_project(&path).unwrap();
        let mut second = load_project(&path).unwrap();

        first.segments[0].content = "edited in editor".to_string();
        save_project_checked(&path, &mut first).unwrap();
        assert_eq!(first.revision, 2);

        second.segments[0].adjusted_content = Some("pipeline".to_string());
        let result = save_project_checked(&path, &mut second);
        assert!(matches!(
            result,
            Err(SyncError::ProjectConflict {
                expected: 1,
                found: 2
            })
        ));
        assert_eq!(second.revision, 1);
        assert_eq!(load_project(&path).unwrap().segments[0].content, "edited in editor");
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");
        let mut project = ProjectFile::new("video.mp4", vec![Segment::new(1.0, "x")]);
        save_project(&path, &mut project).unwrap();
        save_project(&path, &mut project).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_project(dir.path().join("missing.json")),
            Err(SyncError::FileNotFound(_))
        ));

        let malformed = dir.path().join("bad.json");
        fs::write(&malformed, "{\"segments\": 5}").unwrap();
        assert!(matches!(
            load_project(&malformed),
            Err(SyncError::InvalidProject(_))
        ));

        let unordered = dir.path().join("unordered.json");
        fs::write(
            &unordered,
            r#"[{"startTime": 5, "content": "a"}, {"startTime": 1, "content": "b"}]"#,
        )
        .unwrap();
        assert!(load_project(&unordered).is_err());
    }
}
