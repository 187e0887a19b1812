// Scripted in-process broker for client tests: accepts one mutually
// authenticated TLS connection and lets the test read and write real
// protocol frames on it.
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use heron_client::CertSource;
use heron_wire::{
    ErrorPayload, Message, MsgId, MsgType, PublishPayload, StartPayload, read_message,
    write_message,
};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

// Certificate material the client side loads through the certificate port.
pub struct TestCerts {
    client_cert: CertificateDer<'static>,
    client_key: Vec<u8>,
    ca_cert: CertificateDer<'static>,
}

impl CertSource for TestCerts {
    fn client_key_pair(
        &self,
    ) -> heron_client::Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        Ok((
            vec![self.client_cert.clone()],
            PrivatePkcs8KeyDer::from(self.client_key.clone()).into(),
        ))
    }

    fn ca_pool(&self) -> heron_client::Result<RootCertStore> {
        let mut pool = RootCertStore::empty();
        pool.add(self.ca_cert.clone()).expect("add test CA");
        Ok(pool)
    }
}

pub struct FakeBroker {
    pub addr: String,
    pub certs: Arc<TestCerts>,
    accept: JoinHandle<BrokerConn>,
}

impl FakeBroker {
    /// Binds a listener on a fresh port and generates self-signed
    /// certificates for both sides: the broker's certificate doubles as
    /// the client's CA, and the client's certificate is the only one the
    /// broker accepts.
    pub async fn start() -> Self {
        let server_key = rcgen::generate_simple_self_signed(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])
        .expect("server cert");
        let client_key =
            rcgen::generate_simple_self_signed(vec!["heron-test-client".to_string()])
                .expect("client cert");

        let mut client_roots = RootCertStore::empty();
        client_roots
            .add(client_key.cert.der().clone())
            .expect("client root");
        let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(client_roots))
            .build()
            .expect("client verifier");

        let server_config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(
                vec![server_key.cert.der().clone()],
                PrivatePkcs8KeyDer::from(server_key.key_pair.serialize_der()).into(),
            )
            .expect("server config");
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();

        let accept = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let stream = acceptor.accept(tcp).await.expect("tls accept");
            BrokerConn { stream }
        });

        Self {
            addr,
            certs: Arc::new(TestCerts {
                client_cert: client_key.cert.der().clone(),
                client_key: client_key.key_pair.serialize_der(),
                ca_cert: server_key.cert.der().clone(),
            }),
            accept,
        }
    }

    /// Waits for the client's TLS connection to land.
    pub async fn connection(self) -> BrokerConn {
        self.accept.await.expect("accept task")
    }
}

pub struct BrokerConn {
    stream: TlsStream<TcpStream>,
}

impl BrokerConn {
    /// Reads the next frame, failing the test if none arrives in time.
    pub async fn read_msg(&mut self) -> Message {
        timeout(Duration::from_secs(2), read_message(&mut self.stream))
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame")
            .expect("stream ended")
    }

    /// Reads until end-of-stream, failing the test if more frames arrive.
    pub async fn expect_eof(&mut self) {
        let got = timeout(Duration::from_secs(2), read_message(&mut self.stream))
            .await
            .expect("timed out waiting for end of stream")
            .expect("read");
        assert!(got.is_none(), "expected end of stream, got {got:?}");
    }

    /// Asserts that the client sends nothing for `quiet`.
    pub async fn expect_silence(&mut self, quiet: Duration) {
        let got = timeout(quiet, read_message(&mut self.stream)).await;
        assert!(got.is_err(), "expected silence, got {got:?}");
    }

    pub async fn send(&mut self, msg: Message) {
        write_message(&mut self.stream, &msg).await.expect("write frame");
    }

    pub async fn ack(&mut self, msg_id: MsgId) {
        self.send(Message::new(MsgType::Ack, msg_id, Bytes::new())).await;
    }

    pub async fn error(&mut self, msg_id: MsgId, text: &str) {
        let payload = ErrorPayload {
            error: text.to_string(),
        }
        .encode()
        .expect("encode error");
        self.send(Message::new(MsgType::Error, msg_id, payload)).await;
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) {
        let payload = PublishPayload {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        }
        .encode()
        .expect("encode publish");
        self.send(Message::new(MsgType::Publish, 0, payload)).await;
    }

    /// Reads the Start message, checks its shape, and acknowledges it.
    pub async fn handshake(&mut self) -> StartPayload {
        let msg = self.read_msg().await;
        assert_eq!(msg.mt, MsgType::Start);
        assert_eq!(msg.msg_id, 1, "Start must use message id 1");
        let start = StartPayload::decode(&msg.payload).expect("decode start");
        self.ack(msg.msg_id).await;
        start
    }
}
