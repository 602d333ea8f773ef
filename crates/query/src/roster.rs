//! Belegung der Channels
//!
//! Verknuepft `clientlist` und `channellist` zu einer Liste
//! `Channel-Name -> Nicknames`, wie sie an die Subscriber geht.

use std::collections::HashMap;

use tsrelay_core::ChannelClientPair;
use tsrelay_protocol::Datensatz;

use crate::client::ServerQuery;
use crate::error::{QueryError, QueryResult};

/// `client_type` der Query-Identitaeten (nicht anzeigen)
pub const QUERY_CLIENT_TYP: u8 = 1;

/// Eintrag aus `clientlist`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineClient {
    pub id: u64,
    pub nickname: String,
    pub channel_id: u64,
    pub client_type: u8,
}

/// Eintrag aus `channellist`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
}

fn zahl_feld<T: std::str::FromStr>(satz: &Datensatz, feld: &str) -> QueryResult<T> {
    let wert = satz
        .get(feld)
        .ok_or_else(|| QueryError::Protokoll(format!("Feld '{feld}' fehlt")))?;
    wert.parse()
        .map_err(|_| QueryError::Protokoll(format!("Feld '{feld}' ist keine Zahl: '{wert}'")))
}

impl OnlineClient {
    pub fn aus_datensatz(satz: &Datensatz) -> QueryResult<Self> {
        Ok(Self {
            id: zahl_feld(satz, "clid")?,
            nickname: satz.get("client_nickname").cloned().unwrap_or_default(),
            channel_id: zahl_feld(satz, "cid")?,
            client_type: zahl_feld(satz, "client_type")?,
        })
    }

    pub fn ist_query(&self) -> bool {
        self.client_type == QUERY_CLIENT_TYP
    }
}

impl Channel {
    pub fn aus_datensatz(satz: &Datensatz) -> QueryResult<Self> {
        Ok(Self {
            id: zahl_feld(satz, "cid")?,
            name: satz.get("channel_name").cloned().unwrap_or_default(),
        })
    }
}

/// Ordnet die Clients ihren Channels zu
///
/// - Query-Clients (`client_type == 1`) fehlen im Ergebnis
/// - Channels aus `ausgeblendet` fehlen im Ergebnis
/// - Channels ohne sichtbare Clients fehlen im Ergebnis
/// - Channels mit gleichem Namen werden zusammengelegt
///
/// Reihenfolge der Channels folgt `channels`, die der Nicknames `clients`.
pub fn roster_zusammenfuehren(
    clients: &[OnlineClient],
    channels: &[Channel],
    ausgeblendet: &[u64],
) -> Vec<ChannelClientPair> {
    let mut ergebnis: Vec<ChannelClientPair> = Vec::new();
    let mut index_nach_name: HashMap<&str, usize> = HashMap::new();
    let mut index_nach_cid: HashMap<u64, usize> = HashMap::new();

    for channel in channels.iter().filter(|c| !ausgeblendet.contains(&c.id)) {
        let index = *index_nach_name.entry(&channel.name).or_insert_with(|| {
            ergebnis.push(ChannelClientPair::neu(channel.name.clone(), Vec::new()));
            ergebnis.len() - 1
        });
        index_nach_cid.insert(channel.id, index);
    }

    for client in clients.iter().filter(|c| !c.ist_query()) {
        if let Some(&index) = index_nach_cid.get(&client.channel_id) {
            ergebnis[index].clients.push(client.nickname.clone());
        }
    }

    ergebnis.retain(|paar| !paar.clients.is_empty());
    ergebnis
}

/// Fragt Clients und Channels ab und fuehrt sie zusammen
pub async fn roster_bauen(
    query: &dyn ServerQuery,
    ausgeblendet: &[u64],
) -> QueryResult<Vec<ChannelClientPair>> {
    let clients = query.client_liste().await?;
    let channels = query.channel_liste().await?;
    Ok(roster_zusammenfuehren(&clients, &channels, ausgeblendet))
}
