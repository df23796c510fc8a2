//! SMTP dialog state machine for mailbox probing
//!
//! One value of [`SmtpDialog`] is one conversation with one mail exchanger:
//! greeting, EHLO (falling back to HELO), optional STARTTLS upgrade,
//! `MAIL FROM`, and then any number of `RCPT TO` probes before QUIT. The
//! conversation runs over plain TCP or through a SOCKS5 proxy; every network
//! step carries its own deadline.
//!
//! TLS here intentionally skips certificate verification: the probe only
//! measures RCPT reachability, and the connection is torn down right after.
//! It must never be reused to submit authenticated mail.

use rand::Rng;
use rustls::{pki_types::ServerName, ClientConfig};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream, ReadBuf,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::providers::ProviderProfile;
use crate::proxy::ProxyServer;

/// Destination port for all probes
pub const SMTP_PORT: u16 = 25;
/// Deadline for TCP/SOCKS5 connect and TLS handshakes
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for the best-effort QUIT exchange
pub const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Domains with clean sending reputations used to synthesize the probe
/// sender. Rotating between them keeps a single name from accumulating
/// negative reputation on the receiving side.
pub const SENDER_DOMAINS: &[&str] = &[
    "salesforce.com",
    "sendgrid.net",
    "mailchimp.com",
    "amazonses.com",
    "postmarkapp.com",
];

/// Transport and protocol failures of one dialog
#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("no proxy available")]
    ProxyExhausted,
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("SOCKS5 handshake failed: {0}")]
    Socks(#[from] tokio_socks::Error),
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("server closing channel: {code} {message}")]
    ServiceClosing { code: u16, message: String },
    #[error("unexpected reply to {command}: {code} {message}")]
    Protocol {
        command: &'static str,
        code: u16,
        message: String,
    },
}

impl SmtpError {
    /// Transport-level failures count against the proxy that carried the
    /// connection; protocol surprises and pool exhaustion do not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SmtpError::Io(_)
                | SmtpError::Socks(_)
                | SmtpError::Tls(_)
                | SmtpError::Timeout(_)
                | SmtpError::ServiceClosing { .. }
        )
    }
}

/// A complete SMTP response: final code, final-line text, and every line
/// observed including `NNN-` continuations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Whether an EHLO response advertises the given capability keyword.
    pub fn advertises(&self, capability: &str) -> bool {
        self.lines.iter().any(|line| {
            line.get(4..)
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case(capability))
        })
    }
}

/// Outcome of one `RCPT TO` command on a completed dialog.
#[derive(Debug, Clone)]
pub struct RcptProbe {
    /// The provider's answer implies the mailbox exists
    pub mailbox_exists: bool,
    /// The recipient was accepted outright (2xx)
    pub accepted: bool,
    pub code: u16,
    pub message: String,
}

/// Map an RCPT reply onto a mailbox verdict using the provider's code sets.
///
/// 451/452 lean positive: most large providers answer those to greylist or
/// quota-limit unknown senders rather than to deny the mailbox. The raw code
/// is surfaced so callers can overrule that reading.
pub fn interpret_rcpt(profile: &ProviderProfile, reply: &SmtpReply) -> RcptProbe {
    let mailbox_exists =
        profile.accept_codes.contains(&reply.code) || matches!(reply.code, 451 | 452);
    RcptProbe {
        mailbox_exists,
        accepted: reply.is_positive(),
        code: reply.code,
        message: reply.message.clone(),
    }
}

/// Progress of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Dialing,
    Greeted,
    Heloed,
    MailFromAccepted,
    RcptEvaluated,
    Closed,
}

/// Connection parameters for one dialog
#[derive(Debug)]
pub struct DialOptions<'a> {
    pub mx_host: &'a str,
    pub proxy: Option<&'a ProxyServer>,
    pub helo_host: &'a str,
    pub mail_from: &'a str,
    pub connect_timeout: Duration,
}

/// One SMTP conversation, ready for RCPT probes once opened.
pub struct SmtpDialog {
    stream: BufStream<MailStream>,
    state: DialogState,
    deadline: Duration,
    tls: bool,
}

impl SmtpDialog {
    /// Dial the exchanger and drive the conversation through `MAIL FROM`.
    ///
    /// Performs, in order: TCP or SOCKS5 connect, greeting, EHLO (HELO as
    /// fallback), STARTTLS upgrade when the profile requires TLS and the
    /// server offers it (with a second EHLO over TLS), and `MAIL FROM` with
    /// a synthesized sender.
    pub async fn open(
        options: DialOptions<'_>,
        profile: &ProviderProfile,
    ) -> Result<Self, SmtpError> {
        let deadline = profile.timeout;
        debug!(
            mx = options.mx_host,
            proxied = options.proxy.is_some(),
            "dialing mail exchanger"
        );

        let transport = dial(options.mx_host, options.proxy, options.connect_timeout).await?;
        let mut stream = BufStream::new(MailStream::Plain(transport));
        let mut tls = false;

        let greeting = read_reply(&mut stream, deadline, "greeting").await?;
        check_code(&greeting, 220, "greeting")?;

        let ehlo_cmd = format!("EHLO {}", options.helo_host);
        let mut ehlo = send_command(&mut stream, &ehlo_cmd, deadline, "EHLO").await?;
        if ehlo.code != 250 {
            if ehlo.code == 421 {
                return Err(SmtpError::ServiceClosing {
                    code: ehlo.code,
                    message: ehlo.message,
                });
            }
            let helo_cmd = format!("HELO {}", options.helo_host);
            let helo = send_command(&mut stream, &helo_cmd, deadline, "HELO").await?;
            check_code(&helo, 250, "HELO")?;
            ehlo = helo;
        }

        if profile.require_tls && ehlo.advertises("STARTTLS") {
            let reply = send_command(&mut stream, "STARTTLS", deadline, "STARTTLS").await?;
            check_code(&reply, 220, "STARTTLS")?;
            stream = upgrade_tls(stream, options.mx_host, options.connect_timeout).await?;
            tls = true;
            let reply = send_command(&mut stream, &ehlo_cmd, deadline, "EHLO").await?;
            check_code(&reply, 250, "EHLO")?;
            debug!(mx = options.mx_host, "connection upgraded to TLS");
        }

        let mail_cmd = format!("MAIL FROM:<{}>", options.mail_from);
        let reply = send_command(&mut stream, &mail_cmd, deadline, "MAIL FROM").await?;
        check_code(&reply, 250, "MAIL FROM")?;

        Ok(Self {
            stream,
            state: DialogState::MailFromAccepted,
            deadline,
            tls,
        })
    }

    /// Probe one recipient. The dialog stays usable afterwards, so a second
    /// probe (catch-all detection) can reuse the same connection.
    pub async fn rcpt_to(
        &mut self,
        email: &str,
        profile: &ProviderProfile,
    ) -> Result<RcptProbe, SmtpError> {
        let cmd = format!("RCPT TO:<{email}>");
        let reply = send_command(&mut self.stream, &cmd, self.deadline, "RCPT TO").await?;
        self.state = DialogState::RcptEvaluated;
        if reply.code == 421 {
            return Err(SmtpError::ServiceClosing {
                code: reply.code,
                message: reply.message,
            });
        }
        debug!(code = reply.code, message = %reply.message, "RCPT evaluated");
        Ok(interpret_rcpt(profile, &reply))
    }

    /// Best-effort QUIT and socket teardown. Errors and slow replies are
    /// ignored; the deadline here is one second.
    pub async fn quit(mut self) {
        self.state = DialogState::Closed;
        let _ = timeout(QUIT_TIMEOUT, async {
            self.stream.write_all(b"QUIT\r\n").await?;
            self.stream.flush().await
        })
        .await;
        let _ = read_reply(&mut self.stream, QUIT_TIMEOUT, "QUIT").await;
        let _ = timeout(QUIT_TIMEOUT, self.stream.shutdown()).await;
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

/// A plausible throwaway sender for `MAIL FROM`, e.g.
/// `verify.3f82c1d09a4b@sendgrid.net`.
pub fn synthesize_sender() -> String {
    let mut rng = rand::thread_rng();
    let domain = SENDER_DOMAINS[rng.gen_range(0..SENDER_DOMAINS.len())];
    format!("verify.{}@{}", hex_token(&mut rng, 12), domain)
}

/// Random local-part for the catch-all probe.
pub fn random_local_part() -> String {
    hex_token(&mut rand::thread_rng(), 16)
}

fn hex_token(rng: &mut impl Rng, len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..len).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

fn check_code(reply: &SmtpReply, expected: u16, command: &'static str) -> Result<(), SmtpError> {
    if reply.code == expected {
        return Ok(());
    }
    if reply.code == 421 {
        return Err(SmtpError::ServiceClosing {
            code: reply.code,
            message: reply.message.clone(),
        });
    }
    Err(SmtpError::Protocol {
        command,
        code: reply.code,
        message: reply.message.clone(),
    })
}

/// Read one complete SMTP response.
///
/// Lines are CRLF-terminated; `NNN-` continuations are consumed until the
/// terminating `NNN ` (or bare `NNN`) line. Each line read is bounded by
/// `deadline`.
async fn read_reply<S>(
    stream: &mut S,
    deadline: Duration,
    waiting_for: &'static str,
) -> Result<SmtpReply, SmtpError>
where
    S: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = timeout(deadline, stream.read_line(&mut line))
            .await
            .map_err(|_| SmtpError::Timeout(waiting_for))??;
        if n == 0 {
            return Err(SmtpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }
        lines.push(trimmed.to_string());

        let bytes = trimmed.as_bytes();
        let is_status = bytes.len() >= 3 && bytes[..3].iter().all(u8::is_ascii_digit);
        if is_status && (bytes.len() == 3 || bytes[3] == b' ') {
            let code = trimmed[..3].parse::<u16>().unwrap_or(0);
            let message = trimmed.get(4..).unwrap_or("").to_string();
            return Ok(SmtpReply {
                code,
                message,
                lines,
            });
        }
    }
}

async fn send_command<S>(
    stream: &mut S,
    command: &str,
    deadline: Duration,
    waiting_for: &'static str,
) -> Result<SmtpReply, SmtpError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    timeout(deadline, async {
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    })
    .await
    .map_err(|_| SmtpError::Timeout(waiting_for))??;
    read_reply(stream, deadline, waiting_for).await
}

async fn dial(
    host: &str,
    proxy: Option<&ProxyServer>,
    connect_timeout: Duration,
) -> Result<Transport, SmtpError> {
    match proxy {
        None => {
            let stream = timeout(connect_timeout, TcpStream::connect((host, SMTP_PORT)))
                .await
                .map_err(|_| SmtpError::Timeout("connect"))??;
            configure_socket(&stream)?;
            Ok(Transport::Tcp(stream))
        }
        Some(proxy) => {
            let socket = timeout(
                connect_timeout,
                TcpStream::connect((proxy.host.as_str(), proxy.port)),
            )
            .await
            .map_err(|_| SmtpError::Timeout("proxy connect"))??;
            configure_socket(&socket)?;

            let target = (host, SMTP_PORT);
            let stream = match (&proxy.username, &proxy.password) {
                (Some(user), Some(pass)) => timeout(
                    connect_timeout,
                    Socks5Stream::connect_with_password_and_socket(socket, target, user, pass),
                )
                .await
                .map_err(|_| SmtpError::Timeout("SOCKS5 handshake"))??,
                _ => timeout(
                    connect_timeout,
                    Socks5Stream::connect_with_socket(socket, target),
                )
                .await
                .map_err(|_| SmtpError::Timeout("SOCKS5 handshake"))??,
            };
            Ok(Transport::Socks(Box::new(stream)))
        }
    }
}

fn configure_socket(stream: &TcpStream) -> Result<(), SmtpError> {
    stream.set_nodelay(true)?;
    let sock = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(60));
    sock.set_tcp_keepalive(&keepalive)?;
    Ok(())
}

async fn upgrade_tls(
    stream: BufStream<MailStream>,
    host: &str,
    handshake_timeout: Duration,
) -> Result<BufStream<MailStream>, SmtpError> {
    let transport = match stream.into_inner() {
        MailStream::Plain(transport) => transport,
        MailStream::Tls(_) => {
            return Err(SmtpError::Tls("connection is already encrypted".into()));
        }
    };

    let connector = TlsConnector::from(Arc::new(tls_config()?));
    let name = ServerName::try_from(host.to_string())
        .map_err(|e| SmtpError::Tls(format!("invalid server name {host:?}: {e}")))?;

    let tls = timeout(handshake_timeout, connector.connect(name, transport))
        .await
        .map_err(|_| SmtpError::Timeout("TLS handshake"))?
        .map_err(|e| SmtpError::Tls(e.to_string()))?;

    Ok(BufStream::new(MailStream::Tls(Box::new(tls))))
}

fn tls_config() -> Result<ClientConfig, SmtpError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SmtpError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::NoCertificateVerification))
        .with_no_client_auth();
    Ok(config)
}

/// The underlying byte stream: direct TCP or SOCKS5-tunneled.
enum Transport {
    Tcp(TcpStream),
    Socks(Box<Socks5Stream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Socks(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Socks(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Socks(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Socks(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// The conversation stream, before or after the STARTTLS upgrade.
enum MailStream {
    Plain(Transport),
    Tls(Box<TlsStream<Transport>>),
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Certificate verifier that accepts anything. RCPT probing needs the
/// encrypted channel, not the server's identity; see the module docs.
mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub(super) struct NoCertificateVerification;

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::GENERIC;
    use tokio::io::BufReader;

    const DEADLINE: Duration = Duration::from_secs(1);

    async fn reply_for(input: &str) -> SmtpReply {
        let (client, mut server) = tokio::io::duplex(4096);
        server.write_all(input.as_bytes()).await.unwrap();
        drop(server);
        let mut reader = BufReader::new(client);
        read_reply(&mut reader, DEADLINE, "test").await.unwrap()
    }

    #[tokio::test]
    async fn parses_single_line_reply() {
        let reply = reply_for("250 OK\r\n").await;
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message, "OK");
        assert!(reply.is_positive());
    }

    #[tokio::test]
    async fn parses_bare_code_reply() {
        let reply = reply_for("250\r\n").await;
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message, "");
    }

    #[tokio::test]
    async fn consumes_multiline_ehlo_reply() {
        let reply = reply_for(
            "250-mx.example.com greets you\r\n250-PIPELINING\r\n250-STARTTLS\r\n250 END\r\n",
        )
        .await;
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message, "END");
        assert_eq!(reply.lines.len(), 4);
        assert!(reply.advertises("STARTTLS"));
        assert!(reply.advertises("starttls"));
        assert!(!reply.advertises("SMTPUTF8"));
    }

    #[tokio::test]
    async fn skips_non_status_noise_lines() {
        let reply = reply_for("junk without a code\r\n550 5.1.1 User unknown\r\n").await;
        assert_eq!(reply.code, 550);
        assert_eq!(reply.message, "5.1.1 User unknown");
    }

    #[tokio::test]
    async fn eof_is_a_transport_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut reader = BufReader::new(client);
        let err = read_reply(&mut reader, DEADLINE, "test").await.unwrap_err();
        assert!(matches!(err, SmtpError::Io(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn silence_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut reader = BufReader::new(client);
        let err = read_reply(&mut reader, Duration::from_millis(50), "greeting")
            .await
            .unwrap_err();
        assert!(matches!(err, SmtpError::Timeout("greeting")));
    }

    #[tokio::test]
    async fn send_command_writes_crlf_and_reads_reply() {
        let (client, mut server) = tokio::io::duplex(4096);
        server.write_all(b"250 Accepted\r\n").await.unwrap();

        let mut stream = BufStream::new(client);
        let reply = send_command(&mut stream, "MAIL FROM:<a@b.c>", DEADLINE, "MAIL FROM")
            .await
            .unwrap();
        assert_eq!(reply.code, 250);

        let mut written = vec![0u8; 19];
        use tokio::io::AsyncReadExt;
        server.read_exact(&mut written).await.unwrap();
        assert_eq!(&written, b"MAIL FROM:<a@b.c>\r\n");
    }

    #[test]
    fn rcpt_interpretation_follows_profile_code_sets() {
        let reply = |code: u16| SmtpReply {
            code,
            message: String::new(),
            lines: vec![],
        };

        assert!(interpret_rcpt(&GENERIC, &reply(250)).mailbox_exists);
        assert!(interpret_rcpt(&GENERIC, &reply(251)).mailbox_exists);
        // Greylisting and quota answers lean positive.
        assert!(interpret_rcpt(&GENERIC, &reply(451)).mailbox_exists);
        assert!(interpret_rcpt(&GENERIC, &reply(452)).mailbox_exists);
        assert!(!interpret_rcpt(&GENERIC, &reply(451)).accepted);

        assert!(!interpret_rcpt(&GENERIC, &reply(550)).mailbox_exists);
        assert!(!interpret_rcpt(&GENERIC, &reply(554)).mailbox_exists);
        assert!(!interpret_rcpt(&GENERIC, &reply(450)).mailbox_exists);
        assert!(!interpret_rcpt(&GENERIC, &reply(530)).mailbox_exists);
    }

    #[test]
    fn code_421_is_service_closing_not_protocol() {
        let reply = SmtpReply {
            code: 421,
            message: "try later".into(),
            lines: vec!["421 try later".into()],
        };
        let err = check_code(&reply, 250, "RCPT TO").unwrap_err();
        assert!(matches!(err, SmtpError::ServiceClosing { code: 421, .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn protocol_errors_do_not_blame_the_proxy() {
        let reply = SmtpReply {
            code: 554,
            message: "no SMTP service here".into(),
            lines: vec![],
        };
        let err = check_code(&reply, 220, "greeting").unwrap_err();
        assert!(matches!(err, SmtpError::Protocol { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn synthesized_sender_uses_reputable_domains() {
        for _ in 0..20 {
            let sender = synthesize_sender();
            let (local, domain) = sender.split_once('@').unwrap();
            assert!(local.starts_with("verify."));
            let token = &local["verify.".len()..];
            assert_eq!(token.len(), 12);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(SENDER_DOMAINS.contains(&domain));
        }
    }

    #[test]
    fn random_local_part_is_sixteen_hex_chars() {
        let local = random_local_part();
        assert_eq!(local.len(), 16);
        assert!(local.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
