use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use coup::{
    Action, Agent, Card, PlayerId, PlayerMachine, Table,
    constants::STARTING_COINS,
    messages::{Envelope, GameMessage, decode_frame, encode_frame},
};

/// A started machine seated at 0 among `n_players`, holding DUKE and CAPTAIN
fn setup_machine(n_players: PlayerId) -> PlayerMachine {
    let mut machine = PlayerMachine::new(0);
    let mut setup: Vec<_> = (0..n_players).map(GameMessage::player).collect();
    setup.extend((0..n_players).map(|id| GameMessage::coins(id, STARTING_COINS)));
    setup.push(GameMessage::deck(0, Some(Card::Duke)));
    setup.push(GameMessage::deck(0, Some(Card::Captain)));
    for id in 1..n_players {
        setup.push(GameMessage::deck(id, None));
        setup.push(GameMessage::deck(id, None));
    }
    setup.push(GameMessage::start(0));
    setup.push(GameMessage::turn(0));
    for message in &setup {
        machine.apply(message).unwrap();
    }
    machine
}

/// Benchmark parsing a single envelope line
fn bench_parse_envelope(c: &mut Criterion) {
    c.bench_function("parse_envelope", |b| {
        b.iter(|| black_box("SINGLE,3,ACT,3,1,STEAL").parse::<Envelope>());
    });
}

/// Benchmark decoding a deal-sized frame
fn bench_decode_frame(c: &mut Criterion) {
    let mut envelopes: Vec<_> = (0..6).map(|id| Envelope::all(GameMessage::player(id))).collect();
    envelopes.extend((0..6).map(|id| Envelope::all(GameMessage::coins(id, STARTING_COINS))));
    envelopes.extend((1..6).map(|id| Envelope::single(id, GameMessage::deck(id, Some(Card::Duke)))));
    envelopes.extend((1..6).map(|id| Envelope::except(id, GameMessage::deck(id, None))));
    let frame = encode_frame(&envelopes);

    c.bench_function("decode_deal_frame", |b| {
        b.iter(|| decode_frame(black_box(&frame)).filter(Result::is_ok).count());
    });
    c.bench_function("encode_deal_frame", |b| {
        b.iter(|| encode_frame(black_box(&envelopes)));
    });
}

/// Benchmark the legal set on an opening turn with different player counts
fn bench_legal_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("legal_messages");

    for n_players in [2, 4, 6].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{n_players}_players")),
            n_players,
            |b, &n| {
                let machine = setup_machine(n);
                b.iter(|| machine.legal_messages());
            },
        );
    }

    group.finish();
}

/// Benchmark applying one action and the reactions it collects
fn bench_apply_tax(c: &mut Criterion) {
    c.bench_function("apply_tax_round", |b| {
        b.iter_batched(
            || setup_machine(4),
            |mut machine| {
                machine
                    .apply(&GameMessage::act(0, Action::Tax, None))
                    .unwrap();
                for id in 1..4 {
                    machine.apply(&GameMessage::ok(id)).unwrap();
                }
                machine
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark a whole in-process game
fn bench_full_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_game");
    group.sample_size(20);

    for n_players in [2, 6].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{n_players}_players")),
            n_players,
            |b, &n| {
                b.iter_batched(
                    || {
                        let agents = (0..n as u64).map(|seed| Agent::random(Some(seed))).collect();
                        Table::new(agents, Some(1)).unwrap()
                    },
                    |mut table| table.run().unwrap(),
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(codec, bench_parse_envelope, bench_decode_frame);

criterion_group!(
    game_operations,
    bench_legal_messages,
    bench_apply_tax,
    bench_full_game,
);

criterion_main!(codec, game_operations);
