use std::{
    sync::{Arc, RwLock},
    thread,
};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lrc::{Lrc, Weak};

//cargo install cargo-criterion
//cargo criterion

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Clone Lrc", |b| b.iter(clone_lrc));
    c.bench_function("Clone Arc<RwLock>", |b| b.iter(clone_arc));
    c.bench_function("Multiple clone Lrc", |b| b.iter(multi_clone_lrc));
    c.bench_function("Multiple clone Arc<RwLock>", |b| b.iter(multi_clone_arc));
    c.bench_function("Read Lrc", |b| b.iter(read_lrc));
    c.bench_function("Read Arc<RwLock>", |b| b.iter(read_arc));
    c.bench_function("Write Lrc", |b| b.iter(write_lrc));
    c.bench_function("Write Arc<RwLock>", |b| b.iter(write_arc));
    c.bench_function("Upgrade Lrc", |b| b.iter(upgrade_lrc));
    c.bench_function("Upgrade Arc<RwLock>", |b| b.iter(upgrade_arc));
    c.bench_function("Contended writes Lrc", |b| b.iter(contended_lrc));
    c.bench_function("Contended writes Arc<RwLock>", |b| {
        b.iter(contended_arc)
    });
}

fn clone_lrc() {
    let lrc = Lrc::new(100);
    let _ = black_box(Lrc::clone(&lrc));
}

fn clone_arc() {
    let arc = Arc::new(RwLock::new(100));
    let _ = black_box(Arc::clone(&arc));
}

fn multi_clone_lrc() {
    let lrc = Lrc::new(100);
    for _ in 0..100 {
        let _ = black_box(lrc.clone());
    }
}

fn multi_clone_arc() {
    let arc = Arc::new(RwLock::new(100));
    for _ in 0..100 {
        let _ = black_box(arc.clone());
    }
}

fn read_lrc() {
    let lrc = Lrc::new(100);
    for _ in 0..100 {
        black_box(*Lrc::read(&lrc));
    }
}

fn read_arc() {
    let arc = Arc::new(RwLock::new(100));
    for _ in 0..100 {
        black_box(*arc.read().unwrap());
    }
}

fn write_lrc() {
    let lrc = Lrc::new(0);
    for _ in 0..100 {
        *Lrc::write(&lrc) += 1;
    }
    black_box(*Lrc::read(&lrc));
}

fn write_arc() {
    let arc = Arc::new(RwLock::new(0));
    for _ in 0..100 {
        *arc.write().unwrap() += 1;
    }
    black_box(*arc.read().unwrap());
}

fn upgrade_lrc() {
    let lrc = Lrc::new(100);
    let weak = Lrc::downgrade(&lrc);
    for _ in 0..100 {
        let _ = black_box(Weak::upgrade(&weak));
    }
}

fn upgrade_arc() {
    let arc = Arc::new(RwLock::new(100));
    let weak = Arc::downgrade(&arc);
    for _ in 0..100 {
        let _ = black_box(weak.upgrade());
    }
}

fn contended_lrc() {
    let lrc = Lrc::new(0u64);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lrc = lrc.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    *Lrc::write(&lrc) += 1;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    black_box(*Lrc::read(&lrc));
}

fn contended_arc() {
    let arc = Arc::new(RwLock::new(0u64));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let arc = arc.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    *arc.write().unwrap() += 1;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    black_box(*arc.read().unwrap());
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
