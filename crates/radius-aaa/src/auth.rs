//! Access-Request processing
//!
//! ```text
//! decode ─► NAS ─► Message-Authenticator ─► rate hold ─► EAP round
//!        ─► subscriber ─► policy ─► lockout ─► credentials ─► Accept
//! ```
//!
//! Every step after NAS resolution either passes or fails with an
//! [`AuthError`]; [`AuthEngine::handle`] is the only place an error becomes an
//! Access-Reject.

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::Config;
use crate::eap::coordinator::{frame_challenge, frame_failure, frame_success};
use crate::eap::mschapv2::success_attributes;
use crate::eap::{EapContext, EapCoordinator, EapRound};
use crate::error::{AuthError, RejectReason};
use crate::metrics::Metrics;
use crate::models::{Nas, RadiusUser, UserField, UserStatus, normalize_mac, parse_vlans};
use crate::ratelimit::{AuthRateCache, RejectCache};
use crate::repository::{SessionRepository, with_timeout};
use chrono::Utc;
use radius_proto::attributes::vendor::{find_vendor_attribute, microsoft};
use radius_proto::auth::encode_response;
use radius_proto::chap::request_challenge;
use radius_proto::eap::{EapPacket, eap_from_radius_packet};
use radius_proto::message_auth::verify_request_message_authenticator;
use radius_proto::mschap::{derive_mppe_keys, generate_authenticator_response, verify_nt_response};
use radius_proto::{
    Attribute, AttributeType, ChapResponse, Code, Packet, VendorAttribute, VendorId,
    decrypt_user_password, verify_chap_response,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Knobs the auth engine reads on every request
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub reject_max: u32,
    /// Acct-Interim-Interval sent on accept, seconds
    pub acct_interim_interval: u32,
    /// Upper bound for Session-Timeout, seconds
    pub max_session_timeout: u32,
    pub repository_timeout: Duration,
    /// Signs `unauthorized-device` rejects for sources that match no NAS
    pub unknown_nas_secret: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings::from_config(&Config::default())
    }
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        AuthSettings {
            reject_max: config.reject_max,
            acct_interim_interval: config.acct_interim_interval,
            max_session_timeout: config.max_session_timeout,
            repository_timeout: config.repository_timeout(),
            unknown_nas_secret: config.unknown_nas_secret.clone(),
        }
    }
}

/// One Access-Request after NAS resolution
struct AuthRequest<'a> {
    packet: &'a Packet,
    nas: &'a Nas,
    secret: &'a [u8],
    source: IpAddr,
    /// User-Name, or Calling-Station-Id when User-Name is absent
    username: String,
}

enum Decision {
    Accept {
        attributes: Vec<Attribute>,
        eap_identifier: Option<u8>,
    },
    Challenge {
        packet: EapPacket,
        token: String,
    },
}

/// Outcome of NAS resolution for a decoded Access-Request
enum Admission {
    Known(Packet, Nas),
    /// No NAS matched; answered under `unknown_nas_secret`
    Unknown(Packet, Nas),
}

/// User-Name, or Calling-Station-Id when User-Name is absent
fn request_username(packet: &Packet) -> String {
    packet
        .get_string(AttributeType::UserName)
        .filter(|name| !name.is_empty())
        .or_else(|| packet.get_string(AttributeType::CallingStationId))
        .unwrap_or_default()
}

/// Resources an attempt holds until it is resolved
#[derive(Default)]
struct Holds {
    rate_held: bool,
    eap_token: Option<String>,
}

pub struct AuthEngine {
    repo: Arc<dyn SessionRepository>,
    coordinator: Arc<EapCoordinator>,
    rate_cache: Arc<AuthRateCache>,
    reject_cache: Arc<RejectCache>,
    metrics: Arc<Metrics>,
    audit: Arc<AuditLogger>,
    settings: AuthSettings,
}

fn attribute(result: Result<Attribute, radius_proto::PacketError>) -> Result<Attribute, AuthError> {
    result.map_err(|e| AuthError::internal(e.to_string()))
}

fn password_mismatch(message: &str) -> AuthError {
    AuthError::new(RejectReason::PasswordMismatch, message)
}

/// Vendor rate-limit attributes for a NAS vendor, rates in kbps
pub fn rate_attributes(vendor_code: u32, up_kbps: u32, down_kbps: u32) -> Vec<VendorAttribute> {
    if up_kbps == 0 && down_kbps == 0 {
        return vec![];
    }
    let bps = |kbps: u32| kbps.saturating_mul(1024);

    match VendorId::from_u32(vendor_code) {
        Some(VendorId::Mikrotik) => vec![VendorAttribute::string(
            vendor_code,
            8,
            &format!("{}k/{}k", up_kbps, down_kbps),
        )],
        Some(VendorId::Huawei) | Some(VendorId::H3c) => vec![
            VendorAttribute::integer(vendor_code, 1, bps(up_kbps)),
            VendorAttribute::integer(vendor_code, 2, bps(up_kbps)),
            VendorAttribute::integer(vendor_code, 3, bps(down_kbps)),
            VendorAttribute::integer(vendor_code, 4, bps(down_kbps)),
        ],
        Some(VendorId::Zte) => vec![
            VendorAttribute::integer(vendor_code, 83, up_kbps),
            VendorAttribute::integer(vendor_code, 89, down_kbps),
        ],
        _ => vec![],
    }
}

/// MS-CHAP2-Response VSA: ident, flags, peer challenge, reserved, NT-Response
fn parse_ms_chap2_response(value: &[u8]) -> Option<(u8, [u8; 16], [u8; 24])> {
    if value.len() != 50 {
        return None;
    }
    let mut peer_challenge = [0u8; 16];
    peer_challenge.copy_from_slice(&value[2..18]);
    let mut nt_response = [0u8; 24];
    nt_response.copy_from_slice(&value[26..50]);
    Some((value[0], peer_challenge, nt_response))
}

impl AuthEngine {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        coordinator: Arc<EapCoordinator>,
        rate_cache: Arc<AuthRateCache>,
        reject_cache: Arc<RejectCache>,
        metrics: Arc<Metrics>,
        audit: Arc<AuditLogger>,
        settings: AuthSettings,
    ) -> Self {
        AuthEngine {
            repo,
            coordinator,
            rate_cache,
            reject_cache,
            metrics,
            audit,
            settings,
        }
    }

    /// Process one datagram. `None` means a silent drop: undecodable, not an
    /// Access-Request, unknown NAS, or a bad Message-Authenticator.
    pub async fn handle(&self, data: &[u8], source: IpAddr) -> Option<Vec<u8>> {
        let (packet, nas) = match self.admit(data, source).await? {
            Admission::Known(packet, nas) => (packet, nas),
            Admission::Unknown(packet, nas) => {
                return self.reject_unknown_nas(&packet, &nas, source).await;
            }
        };
        self.metrics.auth_request();

        let request = AuthRequest {
            packet: &packet,
            nas: &nas,
            secret: nas.secret.as_bytes(),
            source,
            username: request_username(&packet),
        };

        let mut holds = Holds::default();
        let reply = match self.authenticate(&request, &mut holds).await {
            Ok(Decision::Challenge { packet, token }) => {
                self.challenge(&request, &packet, &token).await
            }
            Ok(Decision::Accept {
                attributes,
                eap_identifier,
            }) => {
                self.release(&request, &mut holds).await;
                self.accept(&request, attributes, eap_identifier).await
            }
            Err(e) => {
                self.release(&request, &mut holds).await;
                self.reject(&request, e).await
            }
        };

        match reply {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(client_ip = %source, error = %e, "Failed to build reply");
                None
            }
        }
    }

    /// Access-Reject with `internal-error` for a request whose processing
    /// died, e.g. a panicked worker
    pub async fn reject_internal(&self, data: &[u8], source: IpAddr) -> Option<Vec<u8>> {
        let (packet, nas) = match self.admit(data, source).await? {
            Admission::Known(packet, nas) => (packet, nas),
            Admission::Unknown(packet, nas) => {
                return self.reject_unknown_nas(&packet, &nas, source).await;
            }
        };
        let request = AuthRequest {
            packet: &packet,
            nas: &nas,
            secret: nas.secret.as_bytes(),
            source,
            username: request_username(&packet),
        };
        self.rate_cache.release(&request.username);
        self.reject(&request, AuthError::internal("internal error")).await.ok()
    }

    /// Access-Reject signed with the fallback secret. Nothing is counted
    /// against the username: the sender is not a trusted NAS.
    async fn reject_unknown_nas(
        &self,
        packet: &Packet,
        nas: &Nas,
        source: IpAddr,
    ) -> Option<Vec<u8>> {
        let request = AuthRequest {
            packet,
            nas,
            secret: nas.secret.as_bytes(),
            source,
            username: request_username(packet),
        };
        let error = AuthError::new(RejectReason::UnauthorizedDevice, "unknown NAS");
        match self.send_reject(&request, error).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(client_ip = %source, error = %e, "Failed to build reply");
                None
            }
        }
    }

    /// Decode, resolve the NAS and check the Message-Authenticator
    async fn admit(&self, data: &[u8], source: IpAddr) -> Option<Admission> {
        let packet = match Packet::decode(data) {
            Ok(packet) if packet.code == Code::AccessRequest => packet,
            Ok(packet) => {
                debug!(client_ip = %source, code = ?packet.code, "Ignoring non-access packet");
                self.metrics.drop_packet();
                return None;
            }
            Err(e) => {
                debug!(client_ip = %source, error = %e, "Dropping malformed packet");
                self.metrics.drop_packet();
                return None;
            }
        };

        let identifier = packet.get_string(AttributeType::NasIdentifier).unwrap_or_default();
        let lookup = self.repo.find_nas(source, &identifier);
        let nas = match with_timeout(self.settings.repository_timeout, lookup).await {
            Ok(Some(nas)) => nas,
            Ok(None) => {
                warn!(
                    client_ip = %source,
                    request_id = packet.identifier,
                    reason = %RejectReason::UnauthorizedDevice,
                    "Access-Request from unknown NAS"
                );
                let Some(secret) = self.settings.unknown_nas_secret.as_deref() else {
                    self.metrics.reject(RejectReason::UnauthorizedDevice);
                    return None;
                };
                return Some(Admission::Unknown(packet, Nas::unknown(source, secret)));
            }
            Err(e) => {
                error!(client_ip = %source, error = %e, "NAS lookup failed");
                self.metrics.drop_packet();
                return None;
            }
        };

        match verify_request_message_authenticator(data, nas.secret.as_bytes()) {
            Some(true) => {}
            Some(false) => {
                warn!(
                    client_ip = %source,
                    request_id = packet.identifier,
                    "Message-Authenticator mismatch"
                );
                self.metrics.drop_packet();
                return None;
            }
            None if packet.has_attribute(AttributeType::EapMessage) => {
                warn!(
                    client_ip = %source,
                    request_id = packet.identifier,
                    "EAP-Message without Message-Authenticator"
                );
                self.metrics.drop_packet();
                return None;
            }
            None => {}
        }

        Some(Admission::Known(packet, nas))
    }

    async fn authenticate(
        &self,
        request: &AuthRequest<'_>,
        holds: &mut Holds,
    ) -> Result<Decision, AuthError> {
        // any reject from here on ends the EAP conversation the State names
        if request.packet.has_attribute(AttributeType::EapMessage) {
            holds.eap_token =
                request.packet.get_string(AttributeType::State).filter(|t| !t.is_empty());
        }
        if request.username.is_empty() {
            return Err(AuthError::new(
                RejectReason::InvalidRequest,
                "missing User-Name and Calling-Station-Id",
            ));
        }
        if request.nas.status == UserStatus::Disabled {
            return Err(AuthError::new(
                RejectReason::UnauthorizedDevice,
                format!("NAS {} is disabled", request.nas.name),
            ));
        }

        let eap = eap_from_radius_packet(request.packet).map_err(|e| {
            AuthError::new(RejectReason::InvalidRequest, format!("malformed EAP-Message: {}", e))
        })?;

        let mut eap_round = None;
        match &eap {
            None => {
                if !self.rate_cache.check(&request.username) {
                    return Err(AuthError::new(
                        RejectReason::RateLimited,
                        "authentication attempts too frequent",
                    ));
                }
                holds.rate_held = true;
            }
            Some(eap) => {
                let ctx = EapContext::new(request.packet, eap, &request.username, request.secret);
                let state = request.packet.get_string(AttributeType::State);
                match self.coordinator.begin(&ctx, state.as_deref()).await? {
                    EapRound::Challenge { packet, token } => {
                        return Ok(Decision::Challenge { packet, token });
                    }
                    EapRound::Response {
                        handler,
                        state,
                        token,
                    } => {
                        holds.eap_token = Some(token.clone());
                        eap_round = Some((handler, state, token));
                    }
                }
            }
        }

        let calling_mac = request
            .packet
            .get_string(AttributeType::CallingStationId)
            .and_then(|raw| normalize_mac(&raw));
        let mac_auth = calling_mac.is_some() && normalize_mac(&request.username) == calling_mac;

        let user = self.resolve_user(request, mac_auth, calling_mac.as_deref()).await?;
        if !mac_auth {
            self.check_policy(request, &user, calling_mac.as_deref()).await?;
        }

        if self.reject_cache.is_over(&request.username, self.settings.reject_max) {
            return Err(AuthError::new(RejectReason::RateLimited, "too many rejects, locked"));
        }

        let mut attributes = Vec::new();
        let mut eap_identifier = None;
        match (&eap, eap_round) {
            (Some(eap), Some((handler, state, token))) => {
                let ctx = EapContext::new(request.packet, eap, &request.username, request.secret)
                    .with_user(&user);
                holds.eap_token = None;
                let verified = self
                    .coordinator
                    .verify(handler.as_ref(), &ctx, &state, &token)
                    .await?;
                attributes.extend(verified.reply_attributes);
                eap_identifier = Some(eap.identifier);
            }
            _ if mac_auth => {
                debug!(username = %request.username, "MAC authentication, skipping password");
            }
            _ => attributes.extend(self.verify_legacy(request, &user)?),
        }

        attributes.extend(self.accept_attributes(request.nas, &user)?);
        self.write_back(request, &user, calling_mac.as_deref()).await;

        Ok(Decision::Accept {
            attributes,
            eap_identifier,
        })
    }

    async fn resolve_user(
        &self,
        request: &AuthRequest<'_>,
        mac_auth: bool,
        calling_mac: Option<&str>,
    ) -> Result<RadiusUser, AuthError> {
        let timeout = self.settings.repository_timeout;
        let found = match calling_mac {
            Some(mac) if mac_auth => with_timeout(timeout, self.repo.find_user_by_mac(mac)).await?,
            _ => {
                with_timeout(timeout, self.repo.find_user_by_username(&request.username)).await?
            }
        };

        let user = found.ok_or_else(|| {
            AuthError::new(
                RejectReason::UserNotFound,
                format!("user {} not found", request.username),
            )
        })?;
        if !user.is_enabled() {
            return Err(AuthError::new(RejectReason::UserDisabled, "user disabled"));
        }
        if user.is_expired(Utc::now()) {
            return Err(AuthError::new(RejectReason::UserExpired, "user expired"));
        }
        Ok(user)
    }

    /// Concurrency limit, then MAC binding, then VLAN binding
    async fn check_policy(
        &self,
        request: &AuthRequest<'_>,
        user: &RadiusUser,
        calling_mac: Option<&str>,
    ) -> Result<(), AuthError> {
        if user.active_num > 0 {
            let active = with_timeout(
                self.settings.repository_timeout,
                self.repo.count_active_sessions(&user.username),
            )
            .await?;
            if active >= user.active_num {
                return Err(AuthError::new(
                    RejectReason::ConcurrencyLimit,
                    format!("{} of {} sessions online", active, user.active_num),
                ));
            }
        }

        if user.bind_mac && !user.mac_addr.is_empty() {
            let bound = normalize_mac(&user.mac_addr);
            if let Some(mac) = calling_mac
                && bound.as_deref() != Some(mac)
            {
                return Err(AuthError::new(RejectReason::MacMismatch, "MAC address mismatch"));
            }
        }

        if user.bind_vlan {
            let port_id = request.packet.get_string(AttributeType::NasPortId).unwrap_or_default();
            let (vlan1, vlan2) = parse_vlans(&port_id);
            if (user.vlanid1 != 0 && vlan1 != 0 && vlan1 != user.vlanid1)
                || (user.vlanid2 != 0 && vlan2 != 0 && vlan2 != user.vlanid2)
            {
                return Err(AuthError::new(RejectReason::VlanMismatch, "VLAN mismatch"));
            }
        }

        Ok(())
    }

    /// PAP, CHAP or MS-CHAPv2 carried in Microsoft VSAs
    fn verify_legacy(
        &self,
        request: &AuthRequest<'_>,
        user: &RadiusUser,
    ) -> Result<Vec<Attribute>, AuthError> {
        let packet = request.packet;

        if let Some(attr) = packet.find_attribute(AttributeType::UserPassword.as_u8()) {
            let password = decrypt_user_password(&attr.value, request.secret, &packet.authenticator)
                .map_err(|e| AuthError::new(RejectReason::InvalidRequest, e.to_string()))?;
            if password != user.password {
                return Err(password_mismatch("password mismatch"));
            }
            return Ok(vec![]);
        }

        if let Some(attr) = packet.find_attribute(AttributeType::ChapPassword.as_u8()) {
            let response = ChapResponse::from_bytes(&attr.value)
                .map_err(|e| AuthError::new(RejectReason::InvalidRequest, e.to_string()))?;
            if !verify_chap_response(&response, &user.password, &request_challenge(packet)) {
                return Err(password_mismatch("CHAP response mismatch"));
            }
            return Ok(vec![]);
        }

        let ms = VendorId::Microsoft.as_u32();
        let challenge = find_vendor_attribute(packet, ms, microsoft::MS_CHAP_CHALLENGE);
        let response = find_vendor_attribute(packet, ms, microsoft::MS_CHAP2_RESPONSE);
        if let (Some(challenge), Some(response)) = (challenge, response) {
            return self.verify_mschapv2(request, user, &challenge, &response);
        }

        Err(AuthError::new(
            RejectReason::InvalidRequest,
            "no supported credentials in request",
        ))
    }

    fn verify_mschapv2(
        &self,
        request: &AuthRequest<'_>,
        user: &RadiusUser,
        challenge: &[u8],
        response: &[u8],
    ) -> Result<Vec<Attribute>, AuthError> {
        let invalid = |what: &str| AuthError::new(RejectReason::InvalidRequest, what);
        let auth_challenge: [u8; 16] = challenge
            .try_into()
            .map_err(|_| invalid("MS-CHAP-Challenge must be 16 bytes"))?;
        let (ident, peer_challenge, nt_response) = parse_ms_chap2_response(response)
            .ok_or_else(|| invalid("MS-CHAP2-Response must be 50 bytes"))?;

        if !verify_nt_response(
            &auth_challenge,
            &peer_challenge,
            &request.username,
            &user.password,
            &nt_response,
        ) {
            return Err(password_mismatch("MS-CHAPv2 NT-Response mismatch"));
        }

        let authenticator_response = generate_authenticator_response(
            &user.password,
            &nt_response,
            &peer_challenge,
            &auth_challenge,
            &request.username,
        );
        let keys = derive_mppe_keys(&user.password, &nt_response);
        success_attributes(
            ident,
            &authenticator_response,
            &keys.send_key,
            &keys.recv_key,
            request.secret,
            &request.packet.authenticator,
        )
    }

    fn accept_attributes(&self, nas: &Nas, user: &RadiusUser) -> Result<Vec<Attribute>, AuthError> {
        let mut attributes = Vec::new();

        let max_timeout = self.settings.max_session_timeout;
        let session_timeout = match user.expire_time {
            Some(expire) => {
                let remaining = (expire - Utc::now()).num_seconds().max(0);
                u32::try_from(remaining).unwrap_or(u32::MAX).min(max_timeout)
            }
            None => max_timeout,
        };
        attributes.push(attribute(Attribute::integer(
            AttributeType::SessionTimeout.as_u8(),
            session_timeout,
        ))?);
        attributes.push(attribute(Attribute::integer(
            AttributeType::AcctInterimInterval.as_u8(),
            self.settings.acct_interim_interval,
        ))?);

        if let Ok(ip) = user.ip_addr.parse::<Ipv4Addr>() {
            attributes.push(attribute(Attribute::ipv4(
                AttributeType::FramedIpAddress.as_u8(),
                ip.octets(),
            ))?);
        }
        if !user.addr_pool.is_empty() {
            attributes.push(attribute(Attribute::string(
                AttributeType::FramedPool.as_u8(),
                user.addr_pool.as_str(),
            ))?);
        }

        for vsa in rate_attributes(nas.vendor_code, user.up_rate, user.down_rate) {
            attributes.push(attribute(vsa.to_attribute())?);
        }

        attributes.push(attribute(Attribute::string(
            AttributeType::ReplyMessage.as_u8(),
            "success",
        ))?);
        Ok(attributes)
    }

    /// Learn MAC and VLAN bindings and stamp `last_online`. Failures are
    /// logged; the accept stands.
    async fn write_back(
        &self,
        request: &AuthRequest<'_>,
        user: &RadiusUser,
        calling_mac: Option<&str>,
    ) {
        let mut updates: Vec<(UserField, String)> = Vec::new();

        if user.mac_addr.is_empty()
            && let Some(mac) = calling_mac
        {
            updates.push((UserField::MacAddr, mac.to_string()));
        }

        let port_id = request.packet.get_string(AttributeType::NasPortId).unwrap_or_default();
        let (vlan1, vlan2) = parse_vlans(&port_id);
        if user.vlanid1 == 0 && vlan1 != 0 {
            updates.push((UserField::Vlanid1, vlan1.to_string()));
        }
        if user.vlanid2 == 0 && vlan2 != 0 {
            updates.push((UserField::Vlanid2, vlan2.to_string()));
        }
        updates.push((UserField::LastOnline, Utc::now().to_rfc3339()));

        for (field, value) in updates {
            let call = self.repo.update_user_field(&user.username, field, &value);
            if let Err(e) = with_timeout(self.settings.repository_timeout, call).await {
                warn!(username = %user.username, field = %field, error = %e, "Write-back failed");
            }
        }
    }

    async fn release(&self, request: &AuthRequest<'_>, holds: &mut Holds) {
        if holds.rate_held {
            self.rate_cache.release(&request.username);
            holds.rate_held = false;
        }
        if let Some(token) = holds.eap_token.take() {
            self.coordinator.discard(&token).await;
        }
    }

    fn response(request: &AuthRequest<'_>, code: Code) -> Packet {
        Packet::new(code, request.packet.identifier, [0u8; 16])
    }

    /// Message-Authenticator placeholder, filled in by `encode_response`
    fn sign_like_request(
        request: &AuthRequest<'_>,
        response: &mut Packet,
    ) -> Result<(), AuthError> {
        if request.packet.has_attribute(AttributeType::MessageAuthenticator)
            && !response.has_attribute(AttributeType::MessageAuthenticator)
        {
            response.add_attribute(attribute(Attribute::new(
                AttributeType::MessageAuthenticator.as_u8(),
                vec![0u8; 16],
            ))?);
        }
        Ok(())
    }

    fn encode(request: &AuthRequest<'_>, response: &mut Packet) -> Result<Vec<u8>, AuthError> {
        Self::sign_like_request(request, response)?;
        encode_response(response, &request.packet.authenticator, request.secret)
            .map_err(|e| AuthError::internal(e.to_string()))
    }

    async fn challenge(
        &self,
        request: &AuthRequest<'_>,
        eap: &EapPacket,
        token: &str,
    ) -> Result<Vec<u8>, AuthError> {
        let mut response = Self::response(request, Code::AccessChallenge);
        frame_challenge(&mut response, eap, token)?;

        self.metrics.challenge();
        debug!(
            username = %request.username,
            client_ip = %request.source,
            eap_type = ?eap.eap_type,
            "Sending Access-Challenge"
        );
        self.audit
            .log(
                AuditEntry::new(AuditEventType::AuthChallenge)
                    .with_username(request.username.as_str())
                    .with_client_ip(request.source)
                    .with_nas_name(request.nas.name.as_str())
                    .with_request_id(request.packet.identifier),
            )
            .await;
        Self::encode(request, &mut response)
    }

    async fn accept(
        &self,
        request: &AuthRequest<'_>,
        attributes: Vec<Attribute>,
        eap_identifier: Option<u8>,
    ) -> Result<Vec<u8>, AuthError> {
        let mut response = Self::response(request, Code::AccessAccept);
        for attr in attributes {
            response.add_attribute(attr);
        }
        if let Some(identifier) = eap_identifier {
            frame_success(&mut response, identifier)?;
        }

        self.metrics.accept();
        info!(
            username = %request.username,
            client_ip = %request.source,
            nas = %request.nas.name,
            "Authentication accepted"
        );
        self.audit
            .log(
                AuditEntry::new(AuditEventType::AuthAccept)
                    .with_username(request.username.as_str())
                    .with_client_ip(request.source)
                    .with_nas_name(request.nas.name.as_str())
                    .with_request_id(request.packet.identifier),
            )
            .await;
        Self::encode(request, &mut response)
    }

    async fn reject(
        &self,
        request: &AuthRequest<'_>,
        error: AuthError,
    ) -> Result<Vec<u8>, AuthError> {
        if !request.username.is_empty() {
            self.reject_cache.incr(&request.username);
        }
        self.send_reject(request, error).await
    }

    async fn send_reject(
        &self,
        request: &AuthRequest<'_>,
        error: AuthError,
    ) -> Result<Vec<u8>, AuthError> {
        self.metrics.reject(error.reason);
        warn!(
            username = %request.username,
            client_ip = %request.source,
            reason = %error.reason,
            message = %error.message,
            "Authentication rejected"
        );
        self.audit
            .log(
                AuditEntry::new(AuditEventType::AuthReject)
                    .with_username(request.username.as_str())
                    .with_client_ip(request.source)
                    .with_nas_name(request.nas.name.as_str())
                    .with_request_id(request.packet.identifier)
                    .with_reason(error.reason)
                    .with_details(error.message.as_str()),
            )
            .await;

        let mut response = Self::response(request, Code::AccessReject);
        response.add_attribute(attribute(Attribute::string(
            AttributeType::ReplyMessage.as_u8(),
            error.message.as_str(),
        ))?);
        let eap_identifier = eap_from_radius_packet(request.packet)
            .ok()
            .flatten()
            .map(|eap| eap.identifier);
        if let Some(identifier) = eap_identifier {
            frame_failure(&mut response, identifier)?;
        }
        Self::encode(request, &mut response)
    }
}
