//! MikroTik RouterOS firewall address list
//!
//! Not a DNS vendor: the address is written into a firewall address list on
//! a router over the RouterOS API (plain TCP, port 8728). The record's
//! domain only labels the entry in logs and history.
//!
//! ```text
//! /login =name=:user =password=:pass          (challenge login on RouterOS < 6.43)
//! /ip/firewall/address-list/print ?disabled=false ?list=:list
//! /ip/firewall/address-list/add   =list=:list =address=:ip     (list empty)
//! /ip/firewall/address-list/set   =.id=:id =address=:ip        (each stale item)
//! ```
//!
//! Words are length-prefixed and a sentence ends with an empty word. The
//! router answers `!re` sentences followed by `!done`; `!trap` reports an
//! error and still ends with `!done`, `!fatal` closes the session.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use openssl::hash::{hash, MessageDigest};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "mikrotik";

const API_PORT: u16 = 8728;
const ADDRESS_LIST_PATTERN: &str = r"^[a-zA-Z]{2,}$";

type Attributes = HashMap<String, String>;

/// One answer to a command: the `!re` rows and the `!done` attributes
#[derive(Debug, Default)]
struct Reply {
    rows: Vec<Attributes>,
    done: Attributes,
}

#[derive(Debug)]
struct Sentence {
    word: String,
    attributes: Attributes,
}

fn encode_length(len: usize) -> Vec<u8> {
    let l = len as u32;
    match len {
        0..=0x7F => vec![l as u8],
        0x80..=0x3FFF => vec![(l >> 8) as u8 | 0x80, l as u8],
        0x4000..=0x1F_FFFF => vec![(l >> 16) as u8 | 0xC0, (l >> 8) as u8, l as u8],
        0x20_0000..=0xFFF_FFFF => vec![(l >> 24) as u8 | 0xE0, (l >> 16) as u8, (l >> 8) as u8, l as u8],
        _ => vec![0xF0, (l >> 24) as u8, (l >> 16) as u8, (l >> 8) as u8, l as u8],
    }
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<usize> {
    let first = reader.read_u8().await?;
    let (mut length, extra) = match first {
        b if b & 0x80 == 0x00 => (u32::from(b), 0),
        b if b & 0xC0 == 0x80 => (u32::from(b & !0xC0), 1),
        b if b & 0xE0 == 0xC0 => (u32::from(b & !0xE0), 2),
        b if b & 0xF0 == 0xE0 => (u32::from(b & !0xF0), 3),
        _ => (0, 4),
    };
    for _ in 0..extra {
        length = (length << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(length as usize)
}

async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut word = vec![0; read_length(reader).await?];
    reader.read_exact(&mut word).await?;
    Ok(String::from_utf8_lossy(&word).into_owned())
}

async fn write_sentence<W: AsyncWrite + Unpin>(writer: &mut W, words: &[String]) -> std::io::Result<()> {
    for word in words {
        writer.write_all(&encode_length(word.len())).await?;
        writer.write_all(word.as_bytes()).await?;
    }
    writer.write_all(&[0]).await?;
    writer.flush().await
}

async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Sentence> {
    let mut sentence = Sentence {
        word: String::new(),
        attributes: Attributes::new(),
    };
    loop {
        let word = read_word(reader).await.map_err(connection_lost)?;
        if word.is_empty() {
            return Ok(sentence);
        }
        if sentence.word.is_empty() {
            sentence.word = word;
        } else if let Some(pair) = word.strip_prefix('=') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            sentence.attributes.insert(key.to_string(), value.to_string());
        } else if !word.starts_with(".tag=") {
            return Err(Error::unknown_response(format!("unexpected RouterOS word {word:?}")));
        }
    }
}

fn connection_lost(e: std::io::Error) -> Error {
    Error::transport(format!("router connection: {e}"))
}

/// Response to a legacy login challenge: `00` + hex(MD5(0x00 ++ password ++ challenge))
fn challenge_response(challenge: &[u8], password: &str) -> Result<String> {
    let mut input = Vec::with_capacity(1 + password.len() + challenge.len());
    input.push(0);
    input.extend_from_slice(password.as_bytes());
    input.extend_from_slice(challenge);
    let digest = hash(MessageDigest::md5(), &input)
        .map_err(|e| Error::Other(format!("hashing login challenge: {e}")))?;
    Ok(format!("00{}", hex::encode(digest)))
}

struct RouterSession {
    stream: BufStream<TcpStream>,
}

impl RouterSession {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::transport(format!("connecting to router {addr}: {e}")))?;
        Ok(Self {
            stream: BufStream::new(stream),
        })
    }

    async fn run(&mut self, words: &[String]) -> Result<Reply> {
        write_sentence(&mut self.stream, words).await.map_err(connection_lost)?;
        let mut reply = Reply::default();
        let mut trap = None;
        loop {
            let sentence = read_sentence(&mut self.stream).await?;
            match sentence.word.as_str() {
                "!re" => reply.rows.push(sentence.attributes),
                "!done" => {
                    reply.done = sentence.attributes;
                    break;
                }
                "!trap" => trap = Some(message_of(&sentence)),
                "!fatal" => return Err(Error::unknown_response(format!("fatal: {}", message_of(&sentence)))),
                other => return Err(Error::unknown_response(format!("unexpected RouterOS reply {other:?}"))),
            }
        }
        match trap {
            Some(message) => Err(Error::bad_request(message)),
            None => Ok(reply),
        }
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let name = format!("=name={username}");
        let reply = self
            .run(&["/login".to_string(), name.clone(), format!("=password={password}")])
            .await
            .map_err(login_refused)?;
        let Some(ret) = reply.done.get("ret") else {
            return Ok(());
        };

        let challenge = hex::decode(ret)
            .map_err(|e| Error::unknown_response(format!("login challenge is not hex: {e}")))?;
        let response = challenge_response(&challenge, password)?;
        self.run(&["/login".to_string(), name, format!("=response={response}")])
            .await
            .map_err(login_refused)?;
        Ok(())
    }
}

/// A trapped login is a credential problem; anything else keeps its kind
fn login_refused(e: Error) -> Error {
    match e {
        Error::BadRequest(message) => Error::auth(format!("router login: {message}")),
        other => other,
    }
}

fn message_of(sentence: &Sentence) -> String {
    sentence
        .attributes
        .get("message")
        .cloned()
        .unwrap_or_else(|| format!("{} without message", sentence.word))
}

pub struct MikrotikProvider {
    router: SocketAddr,
    username: String,
    password: String,
    address_list: String,
    description: ProviderDescription,
}

impl fmt::Debug for MikrotikProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MikrotikProvider")
            .field("router", &self.router)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("address_list", &self.address_list)
            .finish()
    }
}

impl MikrotikProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let router_ip: IpAddr = common::required(record, NAME, "router_ip")?
            .parse()
            .map_err(|e| Error::config(format!("{NAME}: router_ip is not an IP address: {e}")))?;
        let address_list = common::required(record, NAME, "address_list")?;
        common::check_format(NAME, "address_list", &address_list, ADDRESS_LIST_PATTERN)?;

        Ok(Self {
            router: SocketAddr::new(router_ip, API_PORT),
            username: common::required(record, NAME, "username")?,
            password: record.credential("password").unwrap_or_default().to_string(),
            address_list,
            description: ProviderDescription::new(NAME, "MikroTik", "https://mikrotik.com/", record),
        })
    }

    /// Talk to a router on another address, used by the tests
    pub fn with_router(mut self, router: SocketAddr) -> Self {
        self.router = router;
        self
    }

    async fn sync(&self, target: UpdateTarget) -> Result<IpAddr> {
        let mut session = RouterSession::connect(self.router).await?;
        session.login(&self.username, &self.password).await?;

        let reply = session
            .run(&[
                "/ip/firewall/address-list/print".to_string(),
                "?disabled=false".to_string(),
                format!("?list={}", self.address_list),
            ])
            .await?;
        let items: Vec<(&str, &str)> = reply
            .rows
            .iter()
            .filter_map(|row| Some((row.get(".id")?.as_str(), row.get("address")?.as_str())))
            .filter(|(id, address)| !id.is_empty() && !address.is_empty())
            .collect();

        let ip = target.ip.to_string();
        if items.is_empty() {
            session
                .run(&[
                    "/ip/firewall/address-list/add".to_string(),
                    format!("=list={}", self.address_list),
                    format!("=address={ip}"),
                ])
                .await?;
            info!(list = %self.address_list, %ip, "added address list item");
            return Ok(target.ip);
        }

        for (id, address) in items.into_iter().filter(|(_, address)| *address != ip) {
            debug!(list = %self.address_list, id, was = address, "setting address list item");
            session
                .run(&[
                    "/ip/firewall/address-list/set".to_string(),
                    format!("=.id={id}"),
                    format!("=address={ip}"),
                ])
                .await?;
        }
        Ok(target.ip)
    }
}

#[async_trait]
impl DnsProvider for MikrotikProvider {
    async fn update(&self, _client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        tokio::time::timeout(transport::DEFAULT_TIMEOUT, self.sync(target))
            .await
            .map_err(|_| Error::transport(format!("router {} timed out", self.router)))?
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(MikrotikProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "router.lan")
            .with_credential("router_ip", "192.168.88.1")
            .with_credential("username", "admin")
            .with_credential("password", "pw")
            .with_credential("address_list", "wanip")
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|w| w.to_string()).collect()
    }

    /// Serve one connection, answering each command with the next canned reply
    async fn fake_router(replies: Vec<Vec<Vec<String>>>) -> (SocketAddr, Arc<Mutex<Vec<Vec<String>>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = BufStream::new(socket);
            for reply in replies {
                let mut command = Vec::new();
                loop {
                    let word = read_word(&mut stream).await.unwrap();
                    if word.is_empty() {
                        break;
                    }
                    command.push(word);
                }
                log.lock().unwrap().push(command);
                for sentence in reply {
                    write_sentence(&mut stream, &sentence).await.unwrap();
                }
            }
        });
        (addr, seen)
    }

    #[test]
    fn lengths_use_the_routeros_prefixes() {
        assert_eq!(encode_length(0x7F), vec![0x7F]);
        assert_eq!(encode_length(0x80), vec![0x80, 0x80]);
        assert_eq!(encode_length(0x4000), vec![0xC0, 0x40, 0x00]);
        assert_eq!(encode_length(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
        assert_eq!(encode_length(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn long_words_read_back_whole() {
        let word = "x".repeat(0x4001);
        let mut buffer = Vec::new();
        write_sentence(&mut buffer, &[word.clone()]).await.unwrap();
        let mut reader = buffer.as_slice();
        assert_eq!(read_word(&mut reader).await.unwrap(), word);
        assert_eq!(read_word(&mut reader).await.unwrap(), "");
    }

    #[test]
    fn challenge_response_matches_routeros() {
        let response = challenge_response(&[0; 16], "").unwrap();
        assert_eq!(response.len(), 34);
        assert!(response.starts_with("00"));
        assert_ne!(challenge_response(&[0; 16], "pw").unwrap(), response);
    }

    #[test]
    fn address_list_name_is_checked() {
        assert!(MikrotikProvider::new(&record().with_credential("address_list", "wan-1")).is_err());
        assert!(MikrotikProvider::new(&record().with_credential("router_ip", "router")).is_err());
    }

    #[tokio::test]
    async fn stale_items_are_set_and_current_ones_kept() {
        let (addr, seen) = fake_router(vec![
            vec![words(&["!done"])],
            vec![
                words(&["!re", "=.id=*1", "=list=wanip", "=address=198.51.100.1"]),
                words(&["!re", "=.id=*2", "=list=wanip", "=address=203.0.113.7"]),
                words(&["!done"]),
            ],
            vec![words(&["!done"])],
        ])
        .await;

        let provider = MikrotikProvider::new(&record()).unwrap().with_router(addr);
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert_eq!(provider.update(&client, target).await.unwrap(), target.ip);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], words(&["/login", "=name=admin", "=password=pw"]));
        assert_eq!(seen[1], words(&["/ip/firewall/address-list/print", "?disabled=false", "?list=wanip"]));
        assert_eq!(seen[2], words(&["/ip/firewall/address-list/set", "=.id=*1", "=address=203.0.113.7"]));
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn trapped_login_is_an_auth_failure() {
        let (addr, _) = fake_router(vec![vec![
            words(&["!trap", "=message=invalid user name or password (6)"]),
            words(&["!done"]),
        ]])
        .await;

        let provider = MikrotikProvider::new(&record()).unwrap().with_router(addr);
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider.update(&client, target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("invalid user name"));
    }
}
