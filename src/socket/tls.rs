//! ClientHello shaping from JA3 strings, on top of BoringSSL.
//!
//! A JA3 string is `version,ciphers,extensions,curves,point_formats` with
//! each list `-`-separated decimal ids. BoringSSL does not let us reorder
//! extensions, so the extension list only decides which features are switched
//! on (ALPN, TLS 1.3, GREASE). Cipher and curve order are honoured.

use crate::base::neterror::NetError;
use crate::socket::stream::{BoxedSocket, StreamSocket};
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use tokio_boring::SslStream;
use tracing::debug;

const EXT_ALPN: u16 = 16;
const EXT_SUPPORTED_VERSIONS: u16 = 43;

/// TLS 1.3 suites are always offered by BoringSSL and cannot be listed in
/// the cipher string.
const TLS13_SUITES: [u16; 3] = [4865, 4866, 4867];

fn cipher_name(id: u16) -> Option<&'static str> {
    Some(match id {
        49195 => "ECDHE-ECDSA-AES128-GCM-SHA256",
        49199 => "ECDHE-RSA-AES128-GCM-SHA256",
        49196 => "ECDHE-ECDSA-AES256-GCM-SHA384",
        49200 => "ECDHE-RSA-AES256-GCM-SHA384",
        52393 => "ECDHE-ECDSA-CHACHA20-POLY1305",
        52392 => "ECDHE-RSA-CHACHA20-POLY1305",
        49161 => "ECDHE-ECDSA-AES128-SHA",
        49162 => "ECDHE-ECDSA-AES256-SHA",
        49171 => "ECDHE-RSA-AES128-SHA",
        49172 => "ECDHE-RSA-AES256-SHA",
        156 => "AES128-GCM-SHA256",
        157 => "AES256-GCM-SHA384",
        47 => "AES128-SHA",
        53 => "AES256-SHA",
        10 => "DES-CBC3-SHA",
        _ => return None,
    })
}

fn curve_name(id: u16) -> Option<&'static str> {
    Some(match id {
        29 => "X25519",
        23 => "P-256",
        24 => "P-384",
        25 => "P-521",
        _ => return None,
    })
}

/// Settings applied to every handshake made by one transport.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: String,
    pub alpn_protos: Vec<String>,
    pub enable_grease: bool,
    pub curves: Vec<String>,
    pub sigalgs: String,
    /// Extension ids from the fingerprint, in ClientHello order.
    pub extensions: Vec<u16>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::default_chrome()
    }
}

impl TlsConfig {
    pub fn default_chrome() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
                ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
                ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305:\
                ECDHE-RSA-AES128-SHA:ECDHE-RSA-AES256-SHA:\
                AES128-GCM-SHA256:AES256-GCM-SHA384:AES128-SHA:AES256-SHA"
                .to_string(),
            alpn_protos: vec!["http/1.1".to_string()],
            enable_grease: true,
            curves: vec!["X25519".to_string(), "P-256".to_string(), "P-384".to_string()],
            sigalgs: "ECDSA+SHA256:RSA-PSS+SHA256:RSA+SHA256:\
                ECDSA+SHA384:RSA-PSS+SHA384:RSA+SHA384:\
                RSA-PSS+SHA512:RSA+SHA512"
                .to_string(),
            extensions: Vec::new(),
        }
    }

    /// Build a config from a JA3 string. Unknown cipher or curve ids are
    /// skipped; an empty result falls back to the Chrome defaults for that
    /// field.
    ///
    /// ```
    /// use mimicnet::socket::tls::TlsConfig;
    ///
    /// let cfg = TlsConfig::from_ja3("771,4865-49195-47,0-16-43,29-23,0").unwrap();
    /// assert_eq!(cfg.cipher_list, "ECDHE-ECDSA-AES128-GCM-SHA256:AES128-SHA");
    /// assert_eq!(cfg.curves, vec!["X25519", "P-256"]);
    /// ```
    pub fn from_ja3(ja3: &str) -> Result<Self, NetError> {
        let fields: Vec<&str> = ja3.trim().split(',').collect();
        if fields.len() != 5 {
            return Err(NetError::InvalidFingerprint(format!(
                "expected 5 comma-separated fields, got {}",
                fields.len()
            )));
        }
        let version: u16 = fields[0]
            .parse()
            .map_err(|_| NetError::InvalidFingerprint(format!("bad version {:?}", fields[0])))?;
        let ciphers = parse_ids(fields[1])?;
        let extensions = parse_ids(fields[2])?;
        let curves = parse_ids(fields[3])?;
        parse_ids(fields[4])?;

        let mut config = Self::default_chrome();

        let legacy = match version {
            769 => SslVersion::TLS1,
            770 => SslVersion::TLS1_1,
            771 => SslVersion::TLS1_2,
            772 => SslVersion::TLS1_3,
            other => {
                return Err(NetError::InvalidFingerprint(format!(
                    "unknown TLS version {other}"
                )))
            }
        };
        if version < 771 {
            config.min_version = Some(legacy);
        }
        let offers_tls13 = version == 772
            || extensions.contains(&EXT_SUPPORTED_VERSIONS)
            || ciphers.iter().any(|c| TLS13_SUITES.contains(c));
        config.max_version = Some(if offers_tls13 {
            SslVersion::TLS1_3
        } else {
            legacy
        });

        let names: Vec<&str> = ciphers
            .iter()
            .filter(|c| !TLS13_SUITES.contains(c))
            .filter_map(|&c| cipher_name(c))
            .collect();
        if !names.is_empty() {
            config.cipher_list = names.join(":");
        }

        let curve_names: Vec<String> = curves
            .iter()
            .filter_map(|&c| curve_name(c))
            .map(str::to_string)
            .collect();
        if !curve_names.is_empty() {
            config.curves = curve_names;
        }

        if !extensions.is_empty() && !extensions.contains(&EXT_ALPN) {
            config.alpn_protos.clear();
        }
        config.extensions = extensions;
        Ok(config)
    }

    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        builder
            .set_min_proto_version(self.min_version)
            .map_err(|_| NetError::SslProtocolError)?;
        builder
            .set_max_proto_version(self.max_version)
            .map_err(|_| NetError::SslProtocolError)?;
        builder
            .set_cipher_list(&self.cipher_list)
            .map_err(|_| NetError::SslVersionOrCipherMismatch)?;

        if !self.alpn_protos.is_empty() {
            let mut alpn_wire = Vec::new();
            for proto in &self.alpn_protos {
                if proto.len() > 255 {
                    return Err(NetError::SslProtocolError);
                }
                alpn_wire.push(proto.len() as u8);
                alpn_wire.extend_from_slice(proto.as_bytes());
            }
            builder
                .set_alpn_protos(&alpn_wire)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&self.sigalgs)
                .map_err(|_| NetError::SslProtocolError)?;
        }
        if !self.curves.is_empty() {
            builder
                .set_curves_list(&self.curves.join(":"))
                .map_err(|_| NetError::SslProtocolError)?;
        }

        builder.set_grease_enabled(self.enable_grease);
        builder.set_verify(SslVerifyMode::PEER);
        Ok(())
    }

    pub fn connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.apply_to_builder(&mut builder)?;
        Ok(builder.build())
    }

    /// Run a client handshake for `host` over an established socket.
    pub async fn connect<S: StreamSocket + std::fmt::Debug>(
        &self,
        host: &str,
        socket: S,
    ) -> Result<SslStream<S>, NetError> {
        let connector = self.connector()?;
        let mut config = connector
            .configure()
            .map_err(|_| NetError::SslProtocolError)?;
        if !should_set_sni(host) {
            config.set_use_server_name_indication(false);
        }
        tokio_boring::connect(config, host, socket)
            .await
            .map_err(|e| {
                debug!(host, error = %e, "TLS handshake failed");
                NetError::SslProtocolError
            })
    }

    /// [`connect`](Self::connect) and box the result.
    pub async fn connect_boxed(
        &self,
        host: &str,
        socket: BoxedSocket,
    ) -> Result<BoxedSocket, NetError> {
        let tls = self.connect(host, socket).await?;
        Ok(BoxedSocket::labelled(tls, "tls"))
    }
}

/// SNI must not carry an IP literal (RFC 6066).
pub fn should_set_sni(host: &str) -> bool {
    host.trim_matches(|c| c == '[' || c == ']')
        .parse::<std::net::IpAddr>()
        .is_err()
}

fn parse_ids(field: &str) -> Result<Vec<u16>, NetError> {
    field
        .split('-')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>()
                .map_err(|_| NetError::InvalidFingerprint(format!("bad id {s:?}")))
        })
        .collect()
}
