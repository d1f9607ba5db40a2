//! Fichiers produits par CPython 2.7, 3.6 et 3.7 à partir de `fixtures/udt.py`
//! (compilés avec `dfile="/old/path/udt.py"`).
//!
//! Les `*.patched.pyc` ont été vérifiés en les chargeant dans l'interpréteur
//! correspondant : les tracebacks pointent vers `/new/path/udt.py`.

use std::path::PathBuf;

use patchpyc_core::prelude::*;
use patchpyc_core::HeaderFieldKind;
use pretty_assertions::assert_eq;

const OLD: &str = "/old/path/udt.py";
const NEW: &str = "/new/path/udt.py";

fn fixture(name: &str) -> PathBuf { PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name) }

fn read(name: &str) -> Vec<u8> { std::fs::read(fixture(name)).expect("fixture missing") }

const CASES: [(&str, FormatVersion); 3] = [
    ("udt.py27", FormatVersion::Py27),
    ("udt.py36", FormatVersion::Py36),
    ("udt.py37", FormatVersion::Py37),
];

fn units(root: &CodeObject) -> Vec<(usize, String, i32)> {
    root.iter_units().map(|(d, u)| (d, u.name.to_string_lossy(), u.firstlineno)).collect()
}

#[test]
fn fixtures_decode_to_the_expected_tree() -> PycResult<()> {
    for (stem, version) in CASES {
        let c = PycCodec::default().decode_bytes(&read(&format!("{stem}.pyc")))?;
        assert_eq!(c.version, version, "{stem}");
        assert_eq!(
            units(&c.root),
            vec![
                (0, "<module>".to_owned(), 1),
                (1, "foo".to_owned(), 6),
                (2, "bar".to_owned(), 7),
                (1, "Point".to_owned(), 15),
                (2, "norm".to_owned(), 16),
            ],
            "{stem}"
        );
        assert!(c.root.iter_units().all(|(_, u)| u.filename.as_bytes() == OLD.as_bytes()), "{stem}");
        assert_eq!(c.root.kwonlyargcount.is_none(), version.is_python2());
        assert_eq!(c.header.mtime(), Some(0x6acf_b9e4), "{stem}");
    }
    Ok(())
}

#[test]
fn python3_fixture_fields() -> PycResult<()> {
    let c = PycCodec::new(Target::Exact(FormatVersion::Py36)).decode_bytes(&read("udt.py36.pyc"))?;
    assert_eq!(c.header.source_size(), Some(319));
    let root = &c.root;
    assert_eq!(root.code.len(), 38);
    assert_eq!(root.stacksize, 4);
    assert_eq!(root.flags, 64);
    let names: Vec<String> = root.names.iter().map(PyStr::to_string_lossy).collect();
    assert_eq!(names, ["__doc__", "GREETING", "foo", "object", "Point"]);
    assert_eq!(root.filename.kind, StrKind::Ascii);
    // dernière constante : les valeurs par défaut de foo
    assert_eq!(root.consts.last(), Some(&Value::Tuple(vec![Value::Int(3)])));

    let bar = root.iter_units().find(|(_, u)| u.name.as_bytes() == b"bar").map(|(_, u)| u.clone());
    let bar = bar.expect("bar");
    assert_eq!(bar.flags, 83);
    assert_eq!(bar.code.len(), 24);
    assert_eq!(bar.varnames, vec![PyStr::new(StrKind::AsciiInterned, "y")]);
    assert!(bar.consts.contains(&Value::float(1.5)));
    Ok(())
}

#[test]
fn python2_fixture_fields() -> PycResult<()> {
    let c = PycCodec::default().decode_bytes(&read("udt.py27.pyc"))?;
    assert_eq!(c.header.fields.len(), 2);
    assert_eq!(c.header.source_size(), None);
    let point = c.root.iter_units().nth(3).map(|(_, u)| u.clone()).expect("Point");
    assert_eq!(point.name.to_string_lossy(), "Point");
    assert_eq!(point.code.len(), 17);
    assert_eq!(point.stacksize, 1);
    assert_eq!(point.flags, 66);
    assert_eq!(c.root.filename.kind, StrKind::Bytes);
    // 'R' : les noms internés répétés sont résolus
    assert!(point.names.iter().any(|n| n.as_bytes() == b"__name__" && n.kind == StrKind::Interned));
    Ok(())
}

#[test]
fn patched_fixtures_match_reference_bytes() -> PycResult<()> {
    for (stem, _) in CASES {
        let c = PycCodec::default().decode_bytes(&read(&format!("{stem}.pyc")))?;
        let (patched, report) = patch_container(&c, NEW)?;
        assert_eq!(report.units, 5);
        assert_eq!(report.max_depth, 2);
        let bytes = PycCodec::default().encode_to_vec(&patched)?;
        assert_eq!(bytes, read(&format!("{stem}.patched.pyc")), "{stem}");
    }
    Ok(())
}

/// Tout sauf `filename`, constantes code exclues (comparées unité par unité).
fn without_filename(u: &CodeObject) -> CodeObject {
    CodeObject {
        filename: PyStr::bytes(Vec::new()),
        consts: u.consts.iter().filter(|c| !matches!(c, Value::Code(_))).cloned().collect(),
        ..u.clone()
    }
}

#[test]
fn patched_fixtures_differ_only_in_filename() -> PycResult<()> {
    for (stem, version) in CASES {
        let codec = PycCodec::new(Target::Exact(version));
        let original = codec.decode_bytes(&read(&format!("{stem}.pyc")))?;
        let patched = codec.decode_bytes(&read(&format!("{stem}.patched.pyc")))?;
        assert_eq!(patched.header, original.header, "{stem}");
        assert_eq!(patched.root.iter_units().count(), original.root.iter_units().count(), "{stem}");
        for ((da, a), (db, b)) in original.root.iter_units().zip(patched.root.iter_units()) {
            assert_eq!(da, db, "{stem}");
            assert_eq!(without_filename(b), without_filename(a), "{stem}: {}", a.name.to_string_lossy());
            let kinds = |u: &CodeObject| u.consts.iter().map(Value::type_name).collect::<Vec<_>>();
            assert_eq!(kinds(b), kinds(a), "{stem}");
            assert_eq!(a.filename.as_bytes(), OLD.as_bytes());
            assert_eq!(b.filename.as_bytes(), NEW.as_bytes(), "{stem}");
        }
    }
    Ok(())
}

#[test]
fn header_is_copied_verbatim() -> PycResult<()> {
    for (stem, version) in CASES {
        let original = read(&format!("{stem}.pyc"));
        let c = PycCodec::default().decode_bytes(&original)?;
        let (patched, _) = patch_container(&c, NEW)?;
        let bytes = PycCodec::default().encode_to_vec(&patched)?;
        assert_eq!(&bytes[..version.header_len()], &original[..version.header_len()], "{stem}");
        assert_eq!(c.header.fields[0].kind, HeaderFieldKind::Magic);
    }
    Ok(())
}

#[test]
fn reencoded_fixture_decodes_to_the_same_tree() -> PycResult<()> {
    for (stem, _) in CASES {
        let codec = PycCodec::default();
        let c = codec.decode_bytes(&read(&format!("{stem}.pyc")))?;
        let again = codec.decode_bytes(&codec.encode_to_vec(&c)?)?;
        assert_eq!(again, c, "{stem}");
    }
    Ok(())
}

#[test]
fn wrong_target_is_rejected() {
    let codec = PycCodec::new(Target::Exact(FormatVersion::Py37));
    let err = codec.decode_bytes(&read("udt.py36.pyc")).unwrap_err();
    assert!(matches!(err, PycError::IncompatibleFormat { .. }), "{err}");
}

#[test]
fn truncated_fixture_is_malformed() {
    let data = read("udt.py37.pyc");
    for cut in [10, 40, data.len() - 1] {
        let err = PycCodec::default().decode_bytes(&data[..cut]).unwrap_err();
        assert!(matches!(err, PycError::MalformedContainer(_)), "cut at {cut}: {err}");
    }
}

#[test]
fn patch_file_in_place() -> PycResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("udt.pyc");
    std::fs::write(&path, read("udt.py36.pyc"))?;
    let report = patch_file(&PycCodec::default(), &path, &path, NEW)?;
    assert_eq!(report.version, FormatVersion::Py36);
    assert_eq!(std::fs::read(&path)?, read("udt.py36.patched.pyc"));
    Ok(())
}

#[test]
fn patch_file_to_new_path_leaves_source_alone() -> PycResult<()> {
    let dir = tempfile::tempdir()?;
    let old = dir.path().join("old.pyc");
    let new = dir.path().join("new.pyc");
    std::fs::write(&old, read("udt.py27.pyc"))?;
    patch_file(&PycCodec::default(), &old, &new, NEW)?;
    assert_eq!(std::fs::read(&old)?, read("udt.py27.pyc"));
    assert_eq!(std::fs::read(&new)?, read("udt.py27.patched.pyc"));
    Ok(())
}
