//! Turning the textual forms a key/UTXO provider hands over (WIF keys,
//! addresses) into the values the core works with.

use std::str::FromStr;

use bitcoin::Network;

use crate::error::{Error, Result};
use crate::signer::KeyPair;

/// Decode a WIF private key. Only compressed keys are accepted, since every
/// template here commits to the compressed public key.
pub fn key_from_wif(wif: &str) -> Result<(KeyPair, Network)> {
    let private_key = bitcoin::PrivateKey::from_wif(wif)
        .map_err(|e| Error::InvalidKey(format!("WIF: {}", e)))?;
    if !private_key.compressed {
        return Err(Error::InvalidKey(
            "uncompressed WIF keys are not supported".to_string(),
        ));
    }
    Ok((KeyPair::from_secret_key(private_key.inner), private_key.network))
}

/// Whether an address or WIF decoded as `decoded` may be used on `network`.
/// Testnet, signet and (for base58) regtest share their prefixes.
pub fn network_matches(decoded: Network, network: Network) -> bool {
    decoded == network
        || (decoded == Network::Testnet && matches!(network, Network::Signet | Network::Regtest))
}

/// scriptPubKey paid by `address`, which must belong to `network`.
pub fn script_pubkey_for_address(address: &str, network: Network) -> Result<Vec<u8>> {
    let address = bitcoin::Address::from_str(address)
        .map_err(|e| Error::MalformedData(format!("address {}: {}", address, e)))?;
    if !network_matches(address.network, network) {
        return Err(Error::MalformedData(format!(
            "address {} is for {}, not {}",
            address, address.network, network
        )));
    }
    Ok(address.script_pubkey().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{address, p2pkh_script, p2wpkh_script};

    const SIGNET_WIF: &str = "cQRddJriQUjQZhQUaW1RGTNW2o3EdBFbiTJP2qRaXTjoSqk8T39m";

    #[test]
    fn wif_decodes_to_test_network_key() {
        let (key, network) = key_from_wif(SIGNET_WIF).unwrap();
        assert_eq!(network, Network::Testnet);
        assert!(network_matches(network, Network::Signet));
        assert_eq!(key.public_key_bytes().len(), 33);
    }

    #[test]
    fn garbage_wif() {
        assert!(matches!(key_from_wif("not-a-key"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn address_round_trip() {
        let (key, _) = key_from_wif(SIGNET_WIF).unwrap();
        let script = p2wpkh_script(&key.public_key());
        let addr = address(&script, Network::Signet).unwrap();
        assert_eq!(script_pubkey_for_address(&addr, Network::Signet).unwrap(), script);

        let script = p2pkh_script(&key.public_key());
        let addr = address(&script, Network::Signet).unwrap();
        assert_eq!(script_pubkey_for_address(&addr, Network::Regtest).unwrap(), script);
    }

    #[test]
    fn address_for_wrong_network() {
        let (key, _) = key_from_wif(SIGNET_WIF).unwrap();
        let addr = address(&p2wpkh_script(&key.public_key()), Network::Bitcoin).unwrap();
        assert!(matches!(
            script_pubkey_for_address(&addr, Network::Signet),
            Err(Error::MalformedData(_))
        ));
    }
}
