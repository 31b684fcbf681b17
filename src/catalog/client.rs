//! HTTP client for the external music catalog.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::models::{song_from_raw_hit, Lyrics, QrCode, QrLoginEvent, QrLoginKind};
use super::Catalog;
use crate::credential::Credential;
use crate::download::{QualityTier, SongInfo};

const MUSICU_URL: &str = "https://u.y.qq.com/cgi-bin/musicu.fcg";
const LYRIC_URL: &str = "https://c.y.qq.com/lyric/fcgi-bin/fcg_query_lyric_new.fcg";
const STREAM_HOST: &str = "https://isure.stream.qqmusic.qq.com/";
const QQ_QR_SHOW_URL: &str = "https://ssl.ptlogin2.qq.com/ptqrshow";
const QQ_QR_POLL_URL: &str = "https://ssl.ptlogin2.qq.com/ptqrlogin";
const WX_QR_CONNECT_URL: &str = "https://open.weixin.qq.com/connect/qrconnect";
const WX_QR_IMAGE_URL: &str = "https://open.weixin.qq.com/connect/qrcode/";
const WX_QR_POLL_URL: &str = "https://lp.open.weixin.qq.com/connect/l/qrconnect";

/// Filename prefix the vkey service expects per encoding.
fn tier_file_prefix(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Flac => "F000",
        QualityTier::Mp3_320 => "M800",
        QualityTier::Mp3_128 => "M500",
    }
}

/// HTTP client for communicating with the catalog service.
pub struct HttpCatalog {
    client: reqwest::Client,
}

impl HttpCatalog {
    /// Create a new catalog client.
    ///
    /// # Arguments
    /// * `timeout_secs` - Request timeout in seconds, applied to every call
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .cookie_store(true)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// One round-trip through the catalog's unified request gateway.
    ///
    /// Returns the `req_1` payload of the response envelope.
    async fn musicu(&self, request: Value, credential: Option<&Credential>) -> Result<Value> {
        let mut req = self.client.post(MUSICU_URL).json(&json!({
            "comm": {"ct": 11, "cv": "1003006", "v": "1003006"},
            "req_1": request,
        }));
        if let Some(cred) = credential {
            req = req.header(
                reqwest::header::COOKIE,
                format!("uin={}; qqmusic_key={}", cred.musicid, cred.musickey),
            );
        }

        let response = req
            .send()
            .await
            .context("Failed to connect to catalog gateway")?;

        if !response.status().is_success() {
            anyhow::bail!("Catalog gateway returned status {}", response.status());
        }

        let envelope: Value = response
            .json()
            .await
            .context("Failed to parse catalog gateway response")?;

        envelope
            .get("req_1")
            .cloned()
            .context("Catalog gateway response missing req_1")
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SongInfo>> {
        let payload = self
            .musicu(
                json!({
                    "module": "music.search.SearchCgiService",
                    "method": "DoSearchForQQMusicDesktop",
                    "param": {
                        "search_type": 0,
                        "query": keyword,
                        "page_num": 1,
                        "num_per_page": limit,
                    },
                }),
                None,
            )
            .await
            .context("Search request failed")?;

        let hits = payload
            .pointer("/data/body/song/list")
            .and_then(|l| l.as_array())
            .cloned()
            .unwrap_or_default();

        debug!("Search for {:?} returned {} hits", keyword, hits.len());
        Ok(hits.iter().map(song_from_raw_hit).collect())
    }

    async fn song_url(
        &self,
        mid: &str,
        tier: QualityTier,
        credential: Option<&Credential>,
    ) -> Result<Option<String>> {
        let uin = credential.map(|c| c.musicid).unwrap_or(0);
        let filename = format!("{}{}{}{}", tier_file_prefix(tier), mid, mid, tier.extension());
        let payload = self
            .musicu(
                json!({
                    "module": "music.vkey.GetVkeyServer",
                    "method": "CgiGetVkey",
                    "param": {
                        "guid": "tunegrab",
                        "songmid": [mid],
                        "songtype": [0],
                        "filename": [filename],
                        "uin": uin.to_string(),
                        "loginflag": 1,
                        "platform": "20",
                    },
                }),
                credential,
            )
            .await
            .with_context(|| format!("URL resolution failed for {} at {}", mid, tier.label()))?;

        let purl = payload
            .pointer("/data/midurlinfo/0/purl")
            .and_then(|p| p.as_str())
            .unwrap_or_default();

        // An empty purl is the catalog's way of saying "not at this tier".
        if purl.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}{}", STREAM_HOST, purl)))
    }

    async fn lyrics(&self, mid: &str) -> Result<Option<Lyrics>> {
        let response = self
            .client
            .get(LYRIC_URL)
            .query(&[
                ("songmid", mid),
                ("format", "json"),
                ("nobase64", "0"),
                ("g_tk", "5381"),
            ])
            .header(reqwest::header::REFERER, "https://y.qq.com")
            .send()
            .await
            .context("Failed to fetch lyrics")?;

        if !response.status().is_success() {
            anyhow::bail!("Lyric endpoint returned status {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse lyric response")?;

        let decode = |key: &str| {
            use base64::Engine;
            body.get(key)
                .and_then(|v| v.as_str())
                .and_then(|b64| base64::engine::general_purpose::STANDARD.decode(b64).ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()
        };

        let lyrics = Lyrics {
            lyric: decode("lyric"),
            trans: decode("trans"),
        };
        if lyrics.is_empty() {
            return Ok(None);
        }
        Ok(Some(lyrics))
    }

    async fn check_expired(&self, credential: &Credential) -> Result<bool> {
        let payload = self
            .musicu(
                json!({
                    "module": "music.UserInfo.userInfoServer",
                    "method": "GetLoginUserInfo",
                    "param": {},
                }),
                Some(credential),
            )
            .await
            .context("Credential probe failed")?;

        let code = payload.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        Ok(code != 0)
    }

    async fn refresh_credential(&self, credential: &Credential) -> Result<Option<Credential>> {
        let Some(refresh_key) = credential.refresh_key.as_deref() else {
            return Ok(None);
        };

        let payload = self
            .musicu(
                json!({
                    "module": "music.login.LoginServer",
                    "method": "Login",
                    "param": {
                        "refresh_key": refresh_key,
                        "musickey": credential.musickey,
                        "musicid": credential.musicid,
                        "refresh_token": "",
                    },
                }),
                Some(credential),
            )
            .await
            .context("Credential refresh call failed")?;

        let code = payload.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        if code != 0 {
            return Ok(None);
        }

        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let musickey = data
            .get("musickey")
            .and_then(|k| k.as_str())
            .context("Refresh response missing musickey")?
            .to_string();

        Ok(Some(Credential {
            musicid: data
                .get("musicid")
                .and_then(|i| i.as_i64())
                .unwrap_or(credential.musicid),
            musickey,
            refresh_key: data
                .get("refresh_key")
                .and_then(|k| k.as_str())
                .map(str::to_string)
                .or_else(|| credential.refresh_key.clone()),
            encrypt_uin: data
                .get("encryptUin")
                .and_then(|u| u.as_str())
                .map(str::to_string)
                .or_else(|| credential.encrypt_uin.clone()),
            login_type: credential.login_type,
        }))
    }

    async fn request_qrcode(&self, kind: QrLoginKind) -> Result<QrCode> {
        match kind {
            QrLoginKind::Qq => {
                let response = self
                    .client
                    .get(QQ_QR_SHOW_URL)
                    .query(&[
                        ("appid", "716027609"),
                        ("e", "2"),
                        ("l", "M"),
                        ("s", "3"),
                        ("d", "72"),
                        ("v", "4"),
                        ("daid", "383"),
                        ("pt_3rd_aid", "100497308"),
                    ])
                    .send()
                    .await
                    .context("Failed to request QQ login QR code")?;

                let qrsig = response
                    .cookies()
                    .find(|c| c.name() == "qrsig")
                    .map(|c| c.value().to_string())
                    .context("QR response missing qrsig cookie")?;

                let data = response
                    .bytes()
                    .await
                    .context("Failed to read QR image bytes")?
                    .to_vec();

                Ok(QrCode {
                    kind,
                    data,
                    identifier: qrsig,
                })
            }
            QrLoginKind::Wx => {
                let page = self
                    .client
                    .get(WX_QR_CONNECT_URL)
                    .query(&[
                        ("appid", "wx48db31d50e334801"),
                        ("redirect_uri", "https://y.qq.com/portal/wx_redirect.html"),
                        ("response_type", "code"),
                        ("scope", "snsapi_login"),
                    ])
                    .send()
                    .await
                    .context("Failed to request WX login page")?
                    .text()
                    .await
                    .context("Failed to read WX login page")?;

                let uuid = extract_wx_uuid(&page).context("WX login page missing QR uuid")?;

                let data = self
                    .client
                    .get(format!("{}{}", WX_QR_IMAGE_URL, uuid))
                    .send()
                    .await
                    .context("Failed to fetch WX QR image")?
                    .bytes()
                    .await
                    .context("Failed to read WX QR image bytes")?
                    .to_vec();

                Ok(QrCode {
                    kind,
                    data,
                    identifier: uuid,
                })
            }
        }
    }

    async fn poll_qrcode(&self, qr: &QrCode) -> Result<QrLoginEvent> {
        match qr.kind {
            QrLoginKind::Qq => {
                let token = hash33(&qr.identifier).to_string();
                let body = self
                    .client
                    .get(QQ_QR_POLL_URL)
                    .query(&[
                        ("u1", "https://graph.qq.com/oauth2.0/login_jump"),
                        ("ptqrtoken", token.as_str()),
                        ("ptredirect", "0"),
                        ("h", "1"),
                        ("t", "1"),
                        ("g", "1"),
                        ("from_ui", "1"),
                        ("aid", "716027609"),
                        ("daid", "383"),
                        ("pt_3rd_aid", "100497308"),
                    ])
                    .header(reqwest::header::COOKIE, format!("qrsig={}", qr.identifier))
                    .send()
                    .await
                    .context("Failed to poll QQ QR status")?
                    .text()
                    .await
                    .context("Failed to read QQ QR poll body")?;

                // ptuiCB('66','0','','0','...'), first field is the state.
                let code = body
                    .split('\'')
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                match code.as_str() {
                    "66" => Ok(QrLoginEvent::Waiting),
                    "67" => Ok(QrLoginEvent::Scanned),
                    "65" => Ok(QrLoginEvent::Timeout),
                    "68" => Ok(QrLoginEvent::Refused),
                    "0" => {
                        let uin = body
                            .split("&uin=")
                            .nth(1)
                            .and_then(|s| s.split('&').next())
                            .and_then(|s| s.parse::<i64>().ok())
                            .unwrap_or(0);
                        self.authorize(uin, None).await.map(QrLoginEvent::Done)
                    }
                    other => anyhow::bail!("Unexpected QQ QR poll state {:?}", other),
                }
            }
            QrLoginKind::Wx => {
                let body = self
                    .client
                    .get(WX_QR_POLL_URL)
                    .query(&[("uuid", qr.identifier.as_str())])
                    .send()
                    .await
                    .context("Failed to poll WX QR status")?
                    .text()
                    .await
                    .context("Failed to read WX QR poll body")?;

                // window.wx_errcode=405;window.wx_code='...';
                let errcode = body
                    .split("wx_errcode=")
                    .nth(1)
                    .and_then(|s| s.split(';').next())
                    .unwrap_or_default();
                match errcode {
                    "408" => Ok(QrLoginEvent::Waiting),
                    "404" => Ok(QrLoginEvent::Scanned),
                    "402" | "500" => Ok(QrLoginEvent::Timeout),
                    "403" => Ok(QrLoginEvent::Refused),
                    "405" => {
                        let wx_code = body
                            .split("wx_code='")
                            .nth(1)
                            .and_then(|s| s.split('\'').next())
                            .context("WX QR poll missing wx_code")?;
                        self.authorize(0, Some(wx_code)).await.map(QrLoginEvent::Done)
                    }
                    other => anyhow::bail!("Unexpected WX QR poll state {:?}", other),
                }
            }
        }
    }
}

impl HttpCatalog {
    /// Exchange a completed QR scan for a catalog credential.
    async fn authorize(&self, uin: i64, wx_code: Option<&str>) -> Result<Credential> {
        let (login_type, param) = match wx_code {
            Some(code) => (1u8, json!({"strAppid": "wx48db31d50e334801", "code": code})),
            None => (2u8, json!({"code": "", "uin": uin.to_string()})),
        };

        let payload = self
            .musicu(
                json!({
                    "module": "music.login.LoginServer",
                    "method": "Login",
                    "param": param,
                }),
                None,
            )
            .await
            .context("Login exchange failed")?;

        let code = payload.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
        if code != 0 {
            anyhow::bail!("Login exchange rejected with code {}", code);
        }

        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        Ok(Credential {
            musicid: data
                .get("musicid")
                .and_then(|i| i.as_i64())
                .unwrap_or(uin),
            musickey: data
                .get("musickey")
                .and_then(|k| k.as_str())
                .context("Login response missing musickey")?
                .to_string(),
            refresh_key: data
                .get("refresh_key")
                .and_then(|k| k.as_str())
                .map(str::to_string),
            encrypt_uin: data
                .get("encryptUin")
                .and_then(|u| u.as_str())
                .map(str::to_string),
            login_type,
        })
    }
}

/// The checksum ptqrlogin expects over the qrsig cookie.
fn hash33(input: &str) -> u64 {
    let mut hash: u64 = 0;
    for b in input.bytes() {
        hash = hash
            .wrapping_add(hash << 5)
            .wrapping_add(b as u64)
            & 0x7fff_ffff;
    }
    hash
}

/// Pull the QR uuid out of the WX connect page markup.
fn extract_wx_uuid(page: &str) -> Option<String> {
    let idx = page.find("/connect/qrcode/")?;
    let rest = &page[idx + "/connect/qrcode/".len()..];
    let end = rest.find('"')?;
    let uuid = &rest[..end];
    if uuid.is_empty() {
        None
    } else {
        Some(uuid.to_string())
    }
}
