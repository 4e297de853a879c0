use boolean_mpc_with_ferret::crypt_utils::{Aes, AesPrg, Block};
use boolean_mpc_with_ferret::oblivious_transfer::ferret::lpn::multiply_with_random_matrix;
use boolean_mpc_with_ferret::oblivious_transfer::iknp::matrix_transpose;
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_matrix_transpose(c: &mut Criterion) {
    let mut prg = AesPrg::new(Block::from(1u128));
    let src = prg.random_blocks(16384);
    c.bench_function("matrix_transpose_16384", |b| {
        b.iter(|| matrix_transpose(&src))
    });
}

fn bench_aes_encrypt(c: &mut Criterion) {
    let cipher = Aes::new(Aes::fixed_key());
    let mut prg = AesPrg::new(Block::from(2u128));
    let blocks = prg.random_blocks(8192);
    c.bench_function("aes_encrypt_8192", |b| {
        b.iter(|| {
            let mut data = blocks.clone();
            cipher.encrypt_in_place(&mut data);
            data
        })
    });
}

fn bench_prg_bits(c: &mut Criterion) {
    c.bench_function("prg_random_bits_1m", |b| {
        let mut prg = AesPrg::new(Block::from(3u128));
        b.iter(|| prg.random_bits(1 << 20))
    });
}

fn bench_lpn_multiply(c: &mut Criterion) {
    let mut prg = AesPrg::new(Block::from(4u128));
    let src = prg.random_blocks(1024);
    let seed = Block::from_u64s(123, 456);
    c.bench_function("ten_local_linear_16384", |b| {
        b.iter(|| multiply_with_random_matrix(seed, 16384, &src))
    });
}

criterion_group!(
    benches,
    bench_matrix_transpose,
    bench_aes_encrypt,
    bench_prg_bits,
    bench_lpn_multiply
);
criterion_main!(benches);
