use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn synthetic_wad() -> Vec<u8> {
    let mut wad = lump_archive::Archive::new(lump_archive::FormatId::Wad);
    for i in 0..2000 {
        let data = vec![(i % 251) as u8; 512 + i % 1024];
        wad.add_entry(
            "",
            lump_archive::Entry::with_data(format!("LUMP{i:04}"), data),
            None,
        )
        .unwrap();
    }
    wad.write().unwrap().into_inner()
}

pub mod read {
    use divan::Bencher;
    use lump_archive::{Archive, ByteBuffer, FormatId, FormatRegistry, OpenOptions};

    #[divan::bench]
    fn open_deferred(bencher: Bencher) {
        bencher
            .with_inputs(super::synthetic_wad)
            .bench_values(|data| {
                let mut wad = Archive::new(FormatId::Wad);
                wad.open(ByteBuffer::from(data)).unwrap();
                divan::black_box(wad);
            });
    }

    #[divan::bench]
    fn open_eager(bencher: Bencher) {
        let options = OpenOptions::builder().eager_load(true).build();
        bencher
            .with_inputs(super::synthetic_wad)
            .bench_values(|data| {
                let mut wad = Archive::new(FormatId::Wad).with_options(options);
                wad.open(ByteBuffer::from(data)).unwrap();
                divan::black_box(wad);
            });
    }

    #[divan::bench]
    fn detect(bencher: Bencher) {
        let registry = FormatRegistry::standard();
        bencher
            .with_inputs(|| ByteBuffer::from(super::synthetic_wad()))
            .bench_refs(|mc| {
                divan::black_box(registry.detect(mc));
            });
    }

    #[divan::bench(sample_count = 1)]
    fn load_all(bencher: Bencher) {
        let mut wad = Archive::new(FormatId::Wad);
        wad.open(ByteBuffer::from(super::synthetic_wad())).unwrap();
        bencher.bench_local(move || {
            wad.load_all().unwrap();
        });
    }
}

pub mod write {
    use divan::Bencher;
    use lump_archive::{Archive, ByteBuffer, FormatId};

    #[divan::bench(args = [FormatId::Wad, FormatId::Pak, FormatId::Grp, FormatId::Pod])]
    fn convert(bencher: Bencher, format: FormatId) {
        bencher
            .with_inputs(|| {
                let mut wad = Archive::new(FormatId::Wad);
                wad.open(ByteBuffer::from(super::synthetic_wad())).unwrap();
                wad.load_all().unwrap();
                wad.set_format(format).unwrap();
                wad
            })
            .bench_refs(|archive| {
                divan::black_box(archive.write().unwrap());
            });
    }
}
