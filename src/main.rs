use std::process;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use tracing::error;

use create_mixed_bitcoin_transaction::broadcast::{Broadcaster, EsploraBroadcaster};
use create_mixed_bitcoin_transaction::config::Config;
use create_mixed_bitcoin_transaction::provider::{key_from_wif, network_matches};
use create_mixed_bitcoin_transaction::script::{
    address, p2pkh_script, p2sh_p2pkh_script, p2tr_script, p2wpkh_script,
};
use create_mixed_bitcoin_transaction::{
    get_signed_transaction_hex, get_unsigned_transaction_hex, InputKind, KeyPair, Keys, PayFrom,
    PayTo,
};

const WIF: &str = "cQRddJriQUjQZhQUaW1RGTNW2o3EdBFbiTJP2qRaXTjoSqk8T39m";
const UTXO_TXID: &str = "ea4dbbc98ba57adc3ce8593a00afd03ae968d3920b5576818a90b8f305a19ccc";
const UTXO_VALUE: u64 = 200_000;

struct Spend {
    label: &'static str,
    inputs: Vec<PayFrom>,
    outputs: Vec<PayTo>,
}

fn spends(key: &KeyPair) -> Result<Vec<Spend>, Box<dyn std::error::Error>> {
    let secp = Secp256k1::verification_only();
    let public_key = key.public_key();
    let p2tr_input = PayFrom {
        transaction: UTXO_TXID.to_string(),
        vout_index: 2,
        kind: InputKind::P2trKeyPath,
        script_pub_key_of_vout: p2tr_script(&secp, &public_key)?,
        vout_amount_in_sats: UTXO_VALUE,
    };
    let to_self = p2pkh_script(&public_key);

    Ok(vec![
        Spend {
            label: "P2TR + P2WPKH -> P2PKH",
            inputs: vec![
                p2tr_input.clone(),
                PayFrom {
                    transaction: UTXO_TXID.to_string(),
                    vout_index: 1,
                    kind: InputKind::P2wpkh,
                    script_pub_key_of_vout: p2wpkh_script(&public_key),
                    vout_amount_in_sats: UTXO_VALUE,
                },
            ],
            outputs: vec![PayTo {
                script_pub_key: to_self.clone(),
                amount_in_sats: 394_947,
            }],
        },
        Spend {
            label: "P2TR + P2SH-P2PKH -> P2PKH",
            inputs: vec![
                p2tr_input,
                PayFrom {
                    transaction: UTXO_TXID.to_string(),
                    vout_index: 0,
                    kind: InputKind::P2shP2pkh,
                    script_pub_key_of_vout: p2sh_p2pkh_script(&public_key),
                    vout_amount_in_sats: UTXO_VALUE,
                },
            ],
            outputs: vec![PayTo {
                script_pub_key: to_self,
                amount_in_sats: 392_361,
            }],
        },
    ])
}

fn print_addresses(key: &KeyPair, network: Network) -> Result<(), Box<dyn std::error::Error>> {
    let secp = Secp256k1::verification_only();
    let public_key = key.public_key();
    println!("taproot address: {}", address(&p2tr_script(&secp, &public_key)?, network)?);
    println!("p2wpkh address: {}", address(&p2wpkh_script(&public_key), network)?);
    println!("p2sh address: {}", address(&p2sh_p2pkh_script(&public_key), network)?);
    println!("p2pkh address: {}", address(&p2pkh_script(&public_key), network)?);
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    let network = config.network();

    let (key, wif_network) = key_from_wif(WIF)?;
    if !network_matches(wif_network, network) {
        return Err(format!("key is for {}, configured network is {}", wif_network, network).into());
    }
    print_addresses(&key, network)?;

    let broadcaster = if config.broadcast.enabled {
        Some(EsploraBroadcaster::new(&config.broadcast)?)
    } else {
        None
    };

    for spend in spends(&key)? {
        let mut keys = Keys::new();
        for index in 0..spend.inputs.len() {
            keys.insert(index, key);
        }

        let unsigned = get_unsigned_transaction_hex(&spend.inputs, &spend.outputs, 2)?;
        println!("UNSIGNED TRANSACTION ({}): {}", spend.label, unsigned);
        let signed = get_signed_transaction_hex(&spend.inputs, &spend.outputs, &keys, 2)?;
        println!("SIGNED TRANSACTION ({}): {}", spend.label, signed);

        if let Some(broadcaster) = &broadcaster {
            match broadcaster.broadcast(&signed) {
                Ok(txid) => println!("transaction sent: {}", txid),
                Err(e) => error!(spend = spend.label, error = %e, "broadcast failed"),
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
