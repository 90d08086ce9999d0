use bitswap_core::{
    Block, BlockPresence, Entry, Message, ProtocolVersion, WantList, WantType,
};

fn main() {
    let cid = bitswap_core::sha256_cid(b"test").unwrap();
    let pb: bitswap_core::Cid = "QmSnuWmxptJZdLJpKRarxBMS2Ju2oANVrgbr2xWbie9b2D"
        .parse()
        .unwrap();

    let message = Message::new(
        WantList::new(
            vec![
                Entry::new(pb, 1, false, WantType::Block, true),
                Entry::new(cid, 2, false, WantType::Have, true),
            ],
            false,
        ),
        vec![Block::from_cid(&cid, &b"test"[..])],
        vec![BlockPresence::dont_have(pb)],
        0,
    );

    println!("Estimated size: {}", message.size());
    for protocol in ProtocolVersion::ALL {
        let encoded = message.encode(protocol);
        let decoded = Message::decode(&encoded, protocol).unwrap();
        println!(
            "{}: {} bytes, {} entries, {} blocks, {} presences",
            protocol,
            encoded.len(),
            decoded.wantlist().len(),
            decoded.blocks().len(),
            decoded.block_presences().len()
        );
    }
}
