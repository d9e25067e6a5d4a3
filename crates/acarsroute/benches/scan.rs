use acarsroute::route::infer;
use acarsroute::route::scanner::AirportScanner;
use criterion::{criterion_group, criterion_main, Criterion};

const MESSAGE: &str = r#"{"src":{"addr":"A1B2C3","type":"Aircraft","status":"Airborne"},"dst":{"addr":"10916A","type":"Ground station"},"cr":"Command","frame_type":"I","acars":{"err":false,"crc_ok":true,"more":false,"reg":".N123DL","mode":"2","label":"H1","blk_id":"7","ack":"!","flight":"DL0123","msg_num":"D03","msg_num_seq":"A","msg_text":"- #DFB/PER/KPDX,KSEA,1234/FPN/RI:DA:KPDX:AA:KSEA..OLM,N47021W122543"}}"#;

fn codes() -> Vec<String> {
    let mut codes = Vec::new();
    for a in b'A'..=b'Z' {
        for b in [b'A', b'E', b'L', b'O', b'S', b'X'] {
            for c in [b'A', b'D', b'K', b'T', b'X'] {
                codes.push(String::from_utf8(vec![a, b, c]).unwrap());
                codes.push(String::from_utf8(vec![b'K', a, b, c]).unwrap());
            }
        }
    }
    codes
}

fn criterion_benchmark(c: &mut Criterion) {
    let scanner = AirportScanner::new(codes()).unwrap();
    c.bench_function("scan_and_resolve", |b| {
        b.iter(|| infer::resolve(MESSAGE, &scanner.scan(MESSAGE)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
