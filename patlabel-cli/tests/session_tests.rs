//! Session workflow against real files: legacy taxonomy and document
//! migration, ranking, assignment and background persistence.

use patlabel_cli::{FileBytesDecoder, ImageCache, Session};
use patlabel_common::codec::{CodecBackend, TreeBackend};
use patlabel_common::registry::RegistrySource;
use patlabel_common::{MatchMode, ProjectState, Record, TypeRegistry};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const LEGACY_TAXONOMY: &str = "<cloth-types><type>unknown</type><type>cotton</type><type>silk</type></cloth-types>\n\
    <color><type>unknown</type><type>red</type><type>blue</type></color>\n";

fn setup(dir: &Path) -> Arc<TypeRegistry> {
    let attributes = dir.join("__attributes.xml");
    fs::write(&attributes, LEGACY_TAXONOMY).unwrap();
    let registry = TypeRegistry::load_from(&attributes).unwrap();
    assert_eq!(registry.source(), RegistrySource::MigratedLegacy);
    Arc::new(registry)
}

fn record(reg: &TypeRegistry, name: &str, cloth: &str, color: &str) -> Record {
    let mut r = Record::new(reg, name);
    r.set_attribute(reg, "cloth-types", cloth).unwrap();
    r.set_attribute(reg, "color", color).unwrap();
    r
}

#[test]
fn test_legacy_project_opens_ranks_and_saves() {
    let dir = TempDir::new().unwrap();
    let reg = setup(dir.path());
    let document = dir.path().join("patterns.xml");

    let state = ProjectState::new(
        vec![
            record(&reg, "Q", "cotton", "red"),
            record(&reg, "s1", "cotton", "red"),
        ],
        vec![
            record(&reg, "P1", "cotton", "unknown"),
            record(&reg, "P2", "cotton", "red"),
            record(&reg, "P3", "silk", "blue"),
        ],
    );
    TreeBackend.try_save(&document, &state, &reg).unwrap();

    let mut session = Session::open(Arc::clone(&reg), dir.path(), &document).unwrap();
    let q = session.subject_index("Q").unwrap();
    let s1 = session.subject_index("s1").unwrap();

    let names = |session: &Session| -> Vec<String> {
        session
            .candidates(q, &MatchMode::FullAttribute)
            .unwrap()
            .iter()
            .map(|c| c.pattern.base_name.clone())
            .collect()
    };
    // equal usage: catalog order
    assert_eq!(names(&session), ["P1", "P2"]);

    session.assign(s1, "P2").unwrap();
    assert_eq!(names(&session), ["P2", "P1"]);

    session.assign(q, "P3").unwrap();
    assert_eq!(names(&session), ["P3", "P2", "P1"]);

    session.enable_background_save().unwrap();
    session.request_save().unwrap();
    session.close();

    let reopened = Session::open(Arc::clone(&reg), dir.path(), &document).unwrap();
    assert_eq!(reopened.table().count_of("P2"), 1);
    assert_eq!(reopened.table().count_of("P3"), 1);
    assert_eq!(
        reopened.subject(reopened.subject_index("Q").unwrap()).unwrap().mapped_pattern(),
        Some("P3")
    );
}

#[test]
fn test_open_or_create_starts_empty_project() {
    let dir = TempDir::new().unwrap();
    let reg = setup(dir.path());
    let document = dir.path().join("new.xml");

    let mut session = Session::open_or_create(Arc::clone(&reg), dir.path(), &document).unwrap();
    assert!(session.subjects().is_empty());
    assert_eq!(session.navigate(5), 0);

    session.add_pattern(record(&reg, "P1", "silk", "unknown")).unwrap();
    assert!(session.add_pattern(record(&reg, "P1", "silk", "red")).is_err());
    session.save().unwrap();

    let reopened = Session::open(reg, dir.path(), &document).unwrap();
    assert_eq!(reopened.catalog().len(), 1);
}

#[test]
fn test_thumbnails_resolve_below_root() {
    let dir = TempDir::new().unwrap();
    let reg = setup(dir.path());
    let folder = dir.path().join("img001");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("back.jpg"), b"jpeg bytes").unwrap();

    let mut subject = Record::new(&reg, "img001");
    for file in ["front.jpg", "back.jpg"] {
        let path = subject.image_path(dir.path(), file);
        subject.images.push(path);
    }
    let cache = ImageCache::new(1024);

    // front.jpg is missing on disk and is skipped
    let (index, image) = cache.first_decodable(&subject, 0, &FileBytesDecoder).unwrap();
    assert_eq!(index, 1);
    assert_eq!(image.bytes, b"jpeg bytes");
    assert!(cache.contains(&folder.join("back.jpg")));

    // stored names survive a move of the project root
    let moved = subject.image_paths(Path::new("/mnt/shop"));
    assert_eq!(moved[1], Path::new("/mnt/shop/img001/back.jpg"));
}

#[test]
fn test_imported_subjects_persist_with_mapped_attributes() {
    let dir = TempDir::new().unwrap();
    let attributes = dir.path().join("__attributes.xml");
    fs::write(&attributes, LEGACY_TAXONOMY).unwrap();
    let mut registry = TypeRegistry::load_from(&attributes).unwrap();
    registry
        .add_external_mapping("fabric", "cloth-types", "Baumwolle", "cotton")
        .unwrap();
    let reg = Arc::new(registry);
    let document = dir.path().join("patterns.xml");

    for folder in ["1001", "1002"] {
        fs::create_dir(dir.path().join(folder)).unwrap();
        fs::write(dir.path().join(folder).join("front.jpg"), b"jpeg").unwrap();
    }
    let list = dir.path().join("items.txt");
    fs::write(&list, "jdId\tjdTitle\tfabric\n1002\tSummer dress\tBaumwolle\n").unwrap();

    let mut session = Session::open_or_create(Arc::clone(&reg), dir.path(), &document).unwrap();
    assert_eq!(session.import_image_folders(dir.path()).unwrap(), 2);
    let report = session.import_external_list(&list).unwrap();
    assert_eq!((report.added, report.updated, report.mapped), (0, 1, 1));
    session.add_pattern(record(&reg, "P1", "cotton", "unknown")).unwrap();
    session.assign(1, "P1").unwrap();
    session.save().unwrap();

    let reopened = Session::open(reg, dir.path(), &document).unwrap();
    let subject = reopened.subject(reopened.subject_index("1002").unwrap()).unwrap();
    assert_eq!(subject.external_title.as_deref(), Some("Summer dress"));
    assert_eq!(subject.attribute(reopened.registry(), "cloth-types"), Some("cotton"));
    assert_eq!(subject.images, vec![dir.path().join("1002").join("front.jpg")]);
    assert_eq!(reopened.table().count_of("P1"), 1);
}
