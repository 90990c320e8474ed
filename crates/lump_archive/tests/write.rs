use std::path::PathBuf;

use lump_archive::error::{Error, Result};
use lump_archive::{Archive, Entry, EntryState, FormatId, PropertyValue, TypeTag, Warning};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

/// A tree every format can store: short unique names, subdirectories only where allowed
fn sample(format: FormatId) -> Result<Archive> {
    let caps = format.handler().capabilities();
    let mut archive = Archive::new(format);

    if caps.single_entry {
        archive.add_entry("", Entry::with_data("E1M1.LMP", lump(0, 300)), None)?;
        return Ok(archive);
    }

    archive.add_entry("", Entry::with_data("PLAYPAL", lump(1, 768)), None)?;
    archive.add_entry("", Entry::new("F_START"), None)?;
    archive.add_entry("", Entry::with_data("TITLE", lump(2, 64)), None)?;
    if caps.supports_dirs {
        archive.add_entry("sound", Entry::with_data("DSPISTOL", lump(3, 20)), None)?;
        archive.add_entry("sound/extra", Entry::with_data("DSSHOTGN", lump(4, 33)), None)?;
    }

    Ok(archive)
}

fn lump(seed: u8, size: usize) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

fn snapshot(archive: &Archive) -> Vec<(String, u64, Option<Vec<u8>>)> {
    archive
        .entries()
        .into_iter()
        .map(|(path, e)| (path, e.size(), e.data().map(<[u8]>::to_vec)))
        .collect()
}

#[traced_test]
#[test]
fn every_format_round_trips() -> Result<()> {
    for format in FormatId::ALL {
        let mut original = sample(format)?;
        let mc = original.write()?;
        assert!(original.warnings().is_empty(), "{format} warned");

        // Compressed streams without a stored name take it from the file name
        let mut reopened = Archive::new(format);
        reopened.set_filename(Some(PathBuf::from(format!(
            "E1M1.LMP.{}",
            format.extensions()[0]
        ))));
        reopened.open(mc)?;
        reopened.load_all()?;

        assert_eq!(snapshot(&original), snapshot(&reopened), "{format}");
    }
    Ok(())
}

#[test]
fn rewrite_of_unmodified_archive_is_identical() -> Result<()> {
    for format in FormatId::ALL {
        let first = sample(format)?.write()?;

        let mut reopened = Archive::new(format);
        reopened.open(first.clone())?;
        let second = reopened.write()?;

        assert_eq!(first.data(), second.data(), "{format}");
    }
    Ok(())
}

#[test]
fn write_marks_entries_unmodified() -> Result<()> {
    let mut wad = sample(FormatId::Wad)?;
    assert!(wad.is_modified());
    assert!(wad.entries().iter().all(|(_, e)| e.state() == EntryState::New));

    wad.write()?;
    assert!(!wad.is_modified());
    assert!(wad
        .entries()
        .iter()
        .all(|(_, e)| e.state() == EntryState::Unmodified));

    Ok(())
}

#[test]
fn wrappers_refuse_a_second_entry_at_write() -> Result<()> {
    for format in [FormatId::Bz2, FormatId::Gz] {
        let mut archive = sample(FormatId::Wad)?;
        archive.set_format(format)?;

        assert!(matches!(
            archive.write(),
            Err(Error::UnsupportedMutation(_))
        ));
        assert!(archive.is_modified());
    }
    Ok(())
}

#[test]
fn failed_write_leaves_the_file_alone() -> Result<()> {
    let path = std::env::temp_dir().join(format!("lump-write-{}.gz", std::process::id()));
    std::fs::write(&path, b"untouched")?;

    let mut archive = sample(FormatId::Wad)?;
    archive.set_format(FormatId::Gz)?;
    assert!(archive.write_file(&path).is_err());
    assert_eq!(std::fs::read(&path)?, b"untouched");

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn convert_between_formats() -> Result<()> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.open(sample(FormatId::Wad)?.write()?)?;

    wad.set_format(FormatId::Grp)?;
    let grp = wad.write()?;

    let mut reopened = Archive::new(FormatId::Grp);
    reopened.open(grp)?;
    reopened.load_all()?;
    assert_eq!(snapshot(&wad), snapshot(&reopened));

    Ok(())
}

#[test]
fn treeless_formats_refuse_nested_entries() -> Result<()> {
    let mut pak = sample(FormatId::Pak)?;
    pak.set_format(FormatId::Wad)?;
    assert!(matches!(pak.write(), Err(Error::UnsupportedMutation(_))));
    Ok(())
}

#[test]
fn long_names_are_cut_with_a_warning() -> Result<()> {
    let mut wad = Archive::new(FormatId::Wad);
    wad.add_entry("", Entry::with_data("VERYLONGNAME", vec![1]), None)?;
    let mc = wad.write()?;

    assert_eq!(
        wad.take_warnings(),
        vec![Warning::NameTooLong {
            name: "VERYLONGNAME".into(),
            truncated: "VERYLONG".into(),
            limit: 8
        }]
    );
    assert!(wad.warnings().is_empty());

    let mut reopened = Archive::new(FormatId::Wad);
    reopened.open(mc)?;
    assert!(reopened.entry("VERYLONG").is_some());

    Ok(())
}

#[test]
fn folder_markers_keep_pod_directories_out_of_the_table() -> Result<()> {
    let mut pod = sample(FormatId::Pod)?;
    let mut marker = Entry::new("KEEP");
    marker.set_type_tag(TypeTag::folder());
    pod.add_entry("empty", marker, None)?;

    let mut reopened = Archive::new(FormatId::Pod);
    reopened.open(pod.write()?)?;
    assert_eq!(reopened.num_entries(), pod.num_entries() - 1);
    assert!(reopened.dir("empty").is_none());

    Ok(())
}

#[test]
fn entry_properties_survive() -> Result<()> {
    let mut wad2 = Archive::new(FormatId::Wad2);
    let mut texture = Entry::with_data("BRICK1", lump(9, 40));
    texture.set_property("wad2.type", 0x44u8);
    wad2.add_entry("", texture, None)?;

    let mut reopened = Archive::new(FormatId::Wad2);
    reopened.open(wad2.write()?)?;
    assert_eq!(
        reopened.entry("BRICK1").and_then(|e| e.property("wad2.type")),
        Some(&PropertyValue::UInt(0x44))
    );

    Ok(())
}
