//! End-to-end encode/decode tests with random data and loss patterns.

use cauchy256::wire::{pad_payload, unpad_payload, BlockFrame, SessionHeader};
use cauchy256::{
    decode, encode, encode_with, Block, BlockMut, Decoder, Error, FieldConfig, FieldContext, Params, Strategy,
};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

fn random_originals(rng: &mut StdRng, count: usize, block_bytes: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let mut block = vec![0u8; block_bytes];
            rng.fill(&mut block[..]);
            block
        })
        .collect()
}

fn as_blocks(originals: &[Vec<u8>]) -> Vec<Block<'_>> {
    originals
        .iter()
        .enumerate()
        .map(|(i, data)| Block::new(i as u8, data))
        .collect()
}

fn encode_all(params: &Params, originals: &[Vec<u8>]) -> Vec<u8> {
    let mut recovery = vec![0u8; params.recovery_count() * params.block_bytes()];
    encode(params, &as_blocks(originals), &mut recovery).unwrap();
    recovery
}

fn recovery_block(params: &Params, recovery: &[u8], r: usize) -> Vec<u8> {
    let bb = params.block_bytes();
    recovery[r * bb..(r + 1) * bb].to_vec()
}

/// Decode `received` and check every block now holds its original.
fn decode_and_verify(params: &Params, originals: &[Vec<u8>], received: &mut [(u8, Vec<u8>)], lost: usize) {
    let mut blocks: Vec<BlockMut> = received
        .iter_mut()
        .map(|(index, data)| BlockMut::new(*index, data))
        .collect();

    let recovered = decode(params, &mut blocks).unwrap();
    assert_eq!(recovered.len(), lost);

    let mut seen = vec![false; params.original_count()];
    for block in &blocks {
        let idx = block.index as usize;
        assert!(idx < params.original_count(), "block {idx} was not rewritten");
        assert_eq!(&*block.data, &originals[idx][..], "block {idx} mismatch");
        seen[idx] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

/// Lose `lost` random originals, replace them with random recovery blocks,
/// shuffle and decode.
fn random_loss_roundtrip(rng: &mut StdRng, params: &Params, originals: &[Vec<u8>], recovery: &[u8], lost: usize) {
    let k = params.original_count();
    let erased = index::sample(rng, k, lost).into_vec();
    let substitutes = index::sample(rng, params.recovery_count(), lost).into_vec();

    let mut received: Vec<(u8, Vec<u8>)> = (0..k)
        .filter(|i| !erased.contains(i))
        .map(|i| (i as u8, originals[i].clone()))
        .collect();
    for r in substitutes {
        received.push((params.recovery_block_index(r), recovery_block(params, recovery, r)));
    }
    received.shuffle(rng);

    decode_and_verify(params, originals, &mut received, lost);
}

#[test]
fn test_random_roundtrips() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let shapes = [
        (1, 1, 7),
        (1, 3, 64),
        (2, 1, 16),
        (3, 2, 33),
        (4, 2, 8),
        (5, 5, 100),
        (10, 4, 1200),
        (16, 8, 257),
        (30, 20, 64),
        (100, 30, 48),
    ];

    for &(k, m, bb) in &shapes {
        let params = Params::new(k, m, bb).unwrap();
        let originals = random_originals(&mut rng, k, bb);
        let recovery = encode_all(&params, &originals);

        for lost in 0..=m.min(k) {
            for _ in 0..3 {
                random_loss_roundtrip(&mut rng, &params, &originals, &recovery, lost);
            }
        }
    }
}

#[test]
fn test_erase_one_of_four() {
    let params = Params::new(4, 2, 8).unwrap();
    let originals: Vec<Vec<u8>> = (0..4u8).map(|i| (0..8u8).map(|j| i * 37 + j * 11 + 1).collect()).collect();
    let recovery = encode_all(&params, &originals);

    let mut a = originals[0].clone();
    let mut b = originals[1].clone();
    let mut d = originals[3].clone();
    let mut r0 = recovery_block(&params, &recovery, 0);
    let mut blocks = vec![
        BlockMut::new(0, &mut a),
        BlockMut::new(1, &mut b),
        BlockMut::new(3, &mut d),
        BlockMut::new(params.recovery_block_index(0), &mut r0),
    ];

    let recovered = decode(&params, &mut blocks).unwrap();
    assert_eq!(recovered, vec![2]);
    assert_eq!(blocks[3].index, 2);
    assert_eq!(&*blocks[3].data, &originals[2][..]);
}

#[test]
fn test_erase_two_of_four() {
    let params = Params::new(4, 2, 8).unwrap();
    let originals: Vec<Vec<u8>> = (0..4u8).map(|i| (0..8u8).map(|j| i ^ (j << 4) ^ 0xa5).collect()).collect();
    let recovery = encode_all(&params, &originals);

    let mut a = originals[0].clone();
    let mut c = originals[2].clone();
    let mut r0 = recovery_block(&params, &recovery, 0);
    let mut r1 = recovery_block(&params, &recovery, 1);
    let mut blocks = vec![
        BlockMut::new(0, &mut a),
        BlockMut::new(2, &mut c),
        BlockMut::new(4, &mut r0),
        BlockMut::new(5, &mut r1),
    ];

    let recovered = decode(&params, &mut blocks).unwrap();
    assert_eq!(recovered, vec![1, 3]);
    assert_eq!(blocks[2].index, 1);
    assert_eq!(&*blocks[2].data, &originals[1][..]);
    assert_eq!(blocks[3].index, 3);
    assert_eq!(&*blocks[3].data, &originals[3][..]);
}

#[test]
fn test_no_recovery_blocks() {
    let mut rng = StdRng::seed_from_u64(7);
    let params = Params::new(4, 0, 32).unwrap();
    let originals = random_originals(&mut rng, 4, 32);

    let recovery = encode_all(&params, &originals);
    assert!(recovery.is_empty());

    let mut received: Vec<(u8, Vec<u8>)> = (0..3).map(|i| (i as u8, originals[i].clone())).collect();
    let mut blocks: Vec<BlockMut> = received.iter_mut().map(|(i, d)| BlockMut::new(*i, d)).collect();
    assert_eq!(
        decode(&params, &mut blocks),
        Err(Error::InsufficientBlocks { erasures: 1, recovery: 0 })
    );
}

#[test]
fn test_block_limit_boundary() {
    let mut rng = StdRng::seed_from_u64(256);
    assert_eq!(Params::new(200, 57, 16), Err(Error::TooManyBlocks));

    let params = Params::new(200, 56, 16).unwrap();
    let originals = random_originals(&mut rng, 200, 16);
    let recovery = encode_all(&params, &originals);

    // Highest recovery index is 255
    assert_eq!(params.recovery_block_index(55), 255);
    random_loss_roundtrip(&mut rng, &params, &originals, &recovery, 56);
    random_loss_roundtrip(&mut rng, &params, &originals, &recovery, 3);
}

#[test]
fn test_surplus_recovery_rejected() {
    let mut rng = StdRng::seed_from_u64(11);
    let params = Params::new(3, 3, 16).unwrap();
    let originals = random_originals(&mut rng, 3, 16);
    let recovery = encode_all(&params, &originals);

    let mut received: Vec<(u8, Vec<u8>)> = vec![(0, originals[0].clone()), (1, originals[1].clone())];
    for r in 0..3 {
        received.push((params.recovery_block_index(r), recovery_block(&params, &recovery, r)));
    }
    let mut blocks: Vec<BlockMut> = received.iter_mut().map(|(i, d)| BlockMut::new(*i, d)).collect();
    assert_eq!(
        decode(&params, &mut blocks),
        Err(Error::BlockCount { expected: 3, got: 5 })
    );
}

#[test]
fn test_strategies_agree() {
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let params = Params::new(12, 6, 1000).unwrap();
    let originals = random_originals(&mut rng, 12, 1000);
    let blocks = as_blocks(&originals);

    let mut outputs = Vec::new();
    for strategy in Strategy::available() {
        let gf = FieldContext::new(FieldConfig::default().with_strategy(strategy)).unwrap();
        assert_eq!(gf.strategy(), strategy);

        let mut recovery = vec![0u8; 6 * 1000];
        encode_with(&gf, &params, &blocks, &mut recovery).unwrap();

        // Lose four originals and rebuild with this strategy
        let mut received: Vec<(u8, Vec<u8>)> = (4..12).map(|i| (i as u8, originals[i].clone())).collect();
        for r in [5, 1, 3, 0] {
            received.push((params.recovery_block_index(r), recovery_block(&params, &recovery, r)));
        }
        let mut decode_blocks: Vec<BlockMut> = received.iter_mut().map(|(i, d)| BlockMut::new(*i, d)).collect();
        let recovered = Decoder::new(&gf, params, &mut decode_blocks)
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(recovered, vec![0, 1, 2, 3]);
        for block in &decode_blocks {
            assert_eq!(&*block.data, &originals[block.index as usize][..]);
        }

        outputs.push((strategy, recovery));
    }

    let (_, reference) = &outputs[0];
    for (strategy, recovery) in &outputs[1..] {
        assert_eq!(recovery, reference, "{strategy:?} differs from table backend");
    }
}

#[test]
fn test_alternate_polynomial_roundtrip() {
    let mut rng = StdRng::seed_from_u64(99);
    let gf = FieldContext::new(FieldConfig {
        polynomial_index: 0,
        ..FieldConfig::default()
    })
    .unwrap();
    assert_eq!(gf.polynomial(), 0x11d);

    let params = Params::new(6, 3, 64).unwrap();
    let originals = random_originals(&mut rng, 6, 64);
    let mut recovery = vec![0u8; 3 * 64];
    encode_with(&gf, &params, &as_blocks(&originals), &mut recovery).unwrap();

    let mut received: Vec<(u8, Vec<u8>)> = (3..6).map(|i| (i as u8, originals[i].clone())).collect();
    for r in 0..3 {
        received.push((params.recovery_block_index(r), recovery_block(&params, &recovery, r)));
    }
    let mut blocks: Vec<BlockMut> = received.iter_mut().map(|(i, d)| BlockMut::new(*i, d)).collect();
    Decoder::new(&gf, params, &mut blocks).unwrap().decode().unwrap();
    for block in &blocks {
        assert_eq!(&*block.data, &originals[block.index as usize][..]);
    }
}

#[test]
fn test_global_context_shared_across_threads() {
    let contexts: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| FieldContext::global().unwrap() as *const FieldContext as usize))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(contexts.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_sharded_encode_matches_whole() {
    let mut rng = StdRng::seed_from_u64(42);
    let (k, m, bb, shard) = (8, 4, 4096, 1024);
    let params = Params::new(k, m, bb).unwrap();
    let originals = random_originals(&mut rng, k, bb);
    let whole = encode_all(&params, &originals);

    // Every bulk operation is independent per byte offset, so encoding
    // column ranges on separate threads gives the same bytes.
    let pieces: Vec<Vec<u8>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..bb / shard)
            .map(|part| {
                let originals = &originals;
                s.spawn(move || {
                    let range = part * shard..(part + 1) * shard;
                    let params = Params::new(k, m, shard).unwrap();
                    let blocks: Vec<Block> = originals
                        .iter()
                        .enumerate()
                        .map(|(i, data)| Block::new(i as u8, &data[range.clone()]))
                        .collect();
                    let mut out = vec![0u8; m * shard];
                    encode(&params, &blocks, &mut out).unwrap();
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (part, piece) in pieces.iter().enumerate() {
        for r in 0..m {
            let expected = &whole[r * bb + part * shard..r * bb + (part + 1) * shard];
            assert_eq!(&piece[r * shard..(r + 1) * shard], expected);
        }
    }
}

#[test]
fn test_wire_transfer() {
    let messages: [&[u8]; 4] = [b"first message", b"", b"a somewhat longer third message", b"4"];
    let block_bytes = 40;

    let padded: Vec<Vec<u8>> = messages
        .iter()
        .map(|m| pad_payload(m, block_bytes).unwrap())
        .collect();
    let params = Params::new(padded.len(), 2, block_bytes).unwrap();
    let recovery = encode_all(&params, &padded);

    // Sender: header, then originals 0 and 3 and both recovery blocks
    let mut stream = SessionHeader::from_params(&params).unwrap().to_bytes().to_vec();
    for i in [0usize, 3] {
        BlockFrame::new(i as u8, &padded[i]).write_to(&mut stream);
    }
    for r in 0..2 {
        BlockFrame::new(params.recovery_block_index(r), &recovery[r * block_bytes..(r + 1) * block_bytes])
            .write_to(&mut stream);
    }

    // Receiver
    let header = SessionHeader::from_bytes(&stream).unwrap();
    let params = header.params(block_bytes).unwrap();
    let mut rest = &stream[SessionHeader::SIZE..];
    let mut received: Vec<(u8, Vec<u8>)> = Vec::new();
    while !rest.is_empty() {
        let (frame, tail) = BlockFrame::parse(rest, block_bytes).unwrap();
        received.push((frame.index, frame.data.to_vec()));
        rest = tail;
    }

    let mut blocks: Vec<BlockMut> = received.iter_mut().map(|(i, d)| BlockMut::new(*i, d)).collect();
    decode(&params, &mut blocks).unwrap();

    for block in &blocks {
        let idx = block.index as usize;
        assert_eq!(unpad_payload(&*block.data).unwrap(), messages[idx]);
    }
}
