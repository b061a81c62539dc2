use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lampctl::config::{GroupConfig, LampConfig, ProviderConfig};
use lampctl::registry::{MemoryProvider, Registry};
use lampctl::sequencer::decoder::decode;
use lampctl::sequencer::mapping::MappingEntry;
use lampctl::sequencer::{Mapping, Timeline};
use std::sync::Arc;

/// Multi-track file with `notes_per_track` on/off pairs per track,
/// using running status and a tempo change every 64 notes
fn build_file(tracks: u16, notes_per_track: usize) -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&tracks.to_be_bytes());
    bytes.extend_from_slice(&480u16.to_be_bytes());

    for track in 0..tracks {
        let mut body = Vec::new();
        for i in 0..notes_per_track {
            let note = ((i * 7 + track as usize) % 128) as u8;
            if i % 64 == 0 {
                body.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
                body.extend_from_slice(&[0x00, 0x90, note, 100]);
            } else {
                body.extend_from_slice(&[0x00, note, 100]);
            }
            body.extend_from_slice(&[0x60, note, 0]);
        }
        body.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
    }
    bytes
}

fn build_registry(providers: usize) -> Registry {
    let mut registry = Registry::new();
    for p in 0..providers {
        let config = ProviderConfig {
            id: format!("p{}", p),
            name: format!("provider {}", p),
            groups: vec![GroupConfig {
                id: "g".to_string(),
                name: "g".to_string(),
                lamps: (0..32)
                    .map(|l| LampConfig {
                        id: l.to_string(),
                        name: format!("lamp {}", l),
                    })
                    .collect(),
            }],
        };
        registry
            .register(Arc::new(MemoryProvider::from_config(&config)))
            .unwrap();
    }
    registry
}

fn build_mapping(providers: usize) -> Mapping {
    let mut mapping = Mapping::default();
    for note in 0..128u8 {
        mapping.insert(
            note,
            MappingEntry {
                provider_id: format!("p{}", note as usize % providers),
                group_id: "g".to_string(),
                lamp_id: (note % 32).to_string(),
            },
        );
    }
    mapping
}

/// Benchmark decoding (parse + tempo map + merge)
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for tracks in [1u16, 4, 16] {
        let file = build_file(tracks, 1_000);
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &file, |b, file| {
            b.iter(|| black_box(decode(black_box(file)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark compiling decoded events against a mapping
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let events = decode(&build_file(8, 1_000)).unwrap();

    for providers in [1usize, 4, 16] {
        let registry = build_registry(providers);
        let mapping = build_mapping(providers);
        group.bench_with_input(
            BenchmarkId::from_parameter(providers),
            &providers,
            |b, _| {
                b.iter(|| black_box(Timeline::compile(&events, &mapping, &registry).unwrap()));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_compile);
criterion_main!(benches);
