//! Share-URL decoding.
//!
//! A pairing URL is printed inside the QR code the canvas application
//! shows when sharing:
//!
//! ```text
//! https://companion.clip-studio.com/rc/en-us?s=<hex>
//! ```
//!
//! The `s` parameter is hex-coded, XOR-obfuscated text that splits on
//! tab into `host[,host...]`, port, password, and generation tag.

use url::Url;

use crate::error::CompanionError;
use crate::obfuscate;

/// The only host a share URL may carry.
pub const PAIRING_HOST: &str = "companion.clip-studio.com";

/// Connection parameters recovered from a share URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Candidate hosts, tried in order at connect time.
    pub endpoints: Vec<String>,
    /// TCP port shared by every endpoint.
    pub port: u16,
    /// Password in effect for the first Authenticate.
    pub password: String,
    /// Opaque tag identifying this pairing.
    pub generation: String,
}

/// Decode a share URL into its connection parameters.
pub fn decode_config(share_url: &str) -> Result<PairingConfig, CompanionError> {
    let parsed = Url::parse(share_url)
        .map_err(|e| CompanionError::Pairing(format!("invalid share URL: {e}")))?;

    if parsed.scheme() != "https" {
        return Err(CompanionError::Pairing(format!(
            "share URL has scheme '{}', expected 'https'",
            parsed.scheme()
        )));
    }
    if parsed.host_str() != Some(PAIRING_HOST) {
        return Err(CompanionError::Pairing(
            "share URL has incorrect host".into(),
        ));
    }

    let param = parsed
        .query_pairs()
        .find(|(key, _)| key == "s")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CompanionError::Pairing("share URL has no 's' parameter".into()))?;

    let mut bytes = hex::decode(&param)
        .map_err(|e| CompanionError::Pairing(format!("'s' parameter is not hex: {e}")))?;
    obfuscate::obfuscate_remote_param(&mut bytes);

    let text = String::from_utf8(bytes)
        .map_err(|_| CompanionError::Pairing("decoded parameters are not UTF-8".into()))?;
    let fields: Vec<&str> = text.split('\t').collect();
    if fields.len() != 4 {
        return Err(CompanionError::Pairing(format!(
            "expected 4 connection parameters, got {}",
            fields.len()
        )));
    }

    if fields[0].is_empty() {
        return Err(CompanionError::Pairing("endpoint list is empty".into()));
    }
    let endpoints = fields[0].split(',').map(str::to_owned).collect();
    let port: u16 = fields[1]
        .parse()
        .map_err(|_| CompanionError::Pairing(format!("unparseable port '{}'", fields[1])))?;

    Ok(PairingConfig {
        endpoints,
        port,
        password: fields[2].to_owned(),
        generation: fields[3].to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build the share URL a canvas would print for the given parameters.
    fn share_url(params: &str) -> String {
        let mut bytes = params.as_bytes().to_vec();
        obfuscate::obfuscate_remote_param(&mut bytes);
        format!(
            "https://companion.clip-studio.com/rc/en-us?s={}",
            hex::encode(bytes)
        )
    }

    #[test]
    fn decode_share_url() {
        let url = share_url("10.0.0.5,10.0.0.6\t54321\tP@ssw0rd\tG#1:2022.12");
        let config = decode_config(&url).unwrap();
        assert_eq!(config.endpoints, vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(config.port, 54321);
        assert_eq!(config.password, "P@ssw0rd");
        assert_eq!(config.generation, "G#1:2022.12");
    }

    #[test]
    fn single_endpoint() {
        let url = share_url("192.168.1.20\t5900\tpw\tG#2");
        let config = decode_config(&url).unwrap();
        assert_eq!(config.endpoints, vec!["192.168.1.20"]);
    }

    #[test]
    fn hex_case_is_insensitive() {
        let mut bytes = b"10.0.0.5\t5900\tpw\tG#2".to_vec();
        obfuscate::obfuscate_remote_param(&mut bytes);
        let url = format!(
            "https://companion.clip-studio.com/rc?s={}",
            hex::encode_upper(bytes)
        );
        assert!(decode_config(&url).is_ok());
    }

    #[test]
    fn rejects_wrong_host() {
        let err = decode_config("https://example.com/rc?s=00").unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn rejects_non_https() {
        let err = decode_config("http://companion.clip-studio.com/rc?s=00").unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn rejects_missing_or_empty_param() {
        assert!(decode_config("https://companion.clip-studio.com/rc").is_err());
        assert!(decode_config("https://companion.clip-studio.com/rc?s=").is_err());
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(decode_config("https://companion.clip-studio.com/rc?s=zz").is_err());
    }

    #[test]
    fn rejects_wrong_fragment_count() {
        let url = share_url("10.0.0.5\t5900\tpw");
        let err = decode_config(&url).unwrap_err();
        assert!(err.to_string().contains("4 connection parameters"));
    }

    #[test]
    fn rejects_unparseable_port() {
        let url = share_url("10.0.0.5\tnotaport\tpw\tG#2");
        let err = decode_config(&url).unwrap_err();
        assert!(err.to_string().contains("port"));

        let url = share_url("10.0.0.5\t70000\tpw\tG#2");
        assert!(decode_config(&url).is_err());
    }

    #[test]
    fn roundtrip_property() {
        let cases = [
            "a\t1\tb\tc",
            "10.0.0.5,fe80::1,host.local\t65535\tp w!\tG#9:2024.01",
        ];
        for params in cases {
            let config = decode_config(&share_url(params)).unwrap();
            let rebuilt = format!(
                "{}\t{}\t{}\t{}",
                config.endpoints.join(","),
                config.port,
                config.password,
                config.generation
            );
            assert_eq!(rebuilt, params);
        }
    }
}
