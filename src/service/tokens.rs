use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use rust_decimal::{Decimal, RoundingStrategy};

use super::ServiceResult;
use super::utils::{format_balance, u256_to_decimal};
use crate::config::{ContractsConfig, parse_optional_address};

/// Logo shipped with the client for the chain's native currency.
pub const NATIVE_LOGO_ASSET: &str = "avalanche_token_round.png";

const PARTY_V2_LOGO_ADDRESS: &str = "0x25afD99fcB474D7C336A2971F26966da652a92bc";
const PARTY_V1_LOGO_ADDRESS: &str = "0x15957be9802B50c6D66f58a99A2a3d73F5aaf615";

/// Raw-content URL of a token logo in the PartySwap or the Pangolin assets repository.
pub fn token_logo_url(address: &str, party_assets: bool) -> String {
    if party_assets {
        format!("https://raw.githubusercontent.com/PartySwapDEX/token-assets/main/assets/{address}/logo.png")
    } else {
        format!("https://raw.githubusercontent.com/pangolindex/tokens/main/assets/{address}/logo.png")
    }
}

/// Expands a token list URI into the HTTP locations to try, in order.
///
/// `https` is kept, `http` is tried upgraded first, IPFS and IPNS names are
/// mapped to public gateways. Anything else yields no location.
pub fn uri_to_http(uri: &str) -> Vec<String> {
    let Some((protocol, rest)) = uri.split_once(':') else {
        return Vec::new();
    };

    match protocol.to_lowercase().as_str() {
        "https" => vec![uri.to_string()],
        "http" => vec![format!("https:{rest}"), uri.to_string()],
        "ipfs" => {
            let hash = rest.trim_start_matches("//");
            vec![
                format!("https://cloudflare-ipfs.com/ipfs/{hash}/"),
                format!("https://ipfs.io/ipfs/{hash}/"),
            ]
        }
        "ipns" => {
            let name = rest.trim_start_matches("//");
            vec![
                format!("https://cloudflare-ipfs.com/ipns/{name}/"),
                format!("https://ipfs.io/ipns/{name}/"),
            ]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn avax() -> Self {
        Self {
            symbol: "AVAX".to_string(),
            name: "Avalanche".to_string(),
            decimals: 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

/// A token that came from a token list and may carry its own logo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedToken {
    pub token: Token,
    pub logo_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Currency {
    Native(NativeCurrency),
    Contract(Token),
    Listed(ListedToken),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logo {
    /// An image bundled with the client.
    Bundled(&'static str),
    /// Remote locations, first working one wins.
    Remote(Vec<String>),
}

/// Display metadata of a currency, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyInfo {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub address: Option<Address>,
    pub logo: Logo,
}

impl Currency {
    pub fn symbol(&self) -> &str {
        match self {
            Currency::Native(native) => &native.symbol,
            Currency::Contract(token) => &token.symbol,
            Currency::Listed(listed) => &listed.token.symbol,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Currency::Native(native) => &native.name,
            Currency::Contract(token) => &token.name,
            Currency::Listed(listed) => &listed.token.name,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Currency::Native(native) => native.decimals,
            Currency::Contract(token) => token.decimals,
            Currency::Listed(listed) => listed.token.decimals,
        }
    }

    /// Contract address, `None` for the native currency.
    pub fn address(&self) -> Option<Address> {
        match self {
            Currency::Native(_) => None,
            Currency::Contract(token) => Some(token.address),
            Currency::Listed(listed) => Some(listed.token.address),
        }
    }

    pub fn logo(&self) -> Logo {
        match self {
            Currency::Native(_) => Logo::Bundled(NATIVE_LOGO_ASSET),
            Currency::Contract(token) => Logo::Remote(vec![Self::asset_logo(token)]),
            Currency::Listed(listed) => {
                let mut sources = listed
                    .logo_uri
                    .as_deref()
                    .map(uri_to_http)
                    .unwrap_or_default();
                sources.push(Self::asset_logo(&listed.token));
                Logo::Remote(sources)
            }
        }
    }

    pub fn info(&self) -> CurrencyInfo {
        CurrencyInfo {
            symbol: self.symbol().to_string(),
            name: self.name().to_string(),
            decimals: self.decimals(),
            address: self.address(),
            logo: self.logo(),
        }
    }

    fn asset_logo(token: &Token) -> String {
        if token.symbol == "PARTY" {
            let address = if token.name == "PARTY V2" {
                PARTY_V2_LOGO_ADDRESS
            } else {
                PARTY_V1_LOGO_ADDRESS
            };
            token_logo_url(address, true)
        } else {
            token_logo_url(&token.address.to_checksum(None), false)
        }
    }
}

/// An amount of a token in its smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn zero(decimals: u8) -> Self {
        Self::new(U256::ZERO, decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    pub fn to_decimal(&self) -> ServiceResult<Decimal> {
        u256_to_decimal(self.raw, self.decimals)
    }

    /// Exact human-readable value, trailing zeros removed.
    pub fn to_exact(&self) -> String {
        format_balance(self.raw, self.decimals)
    }

    /// Value rounded half-up to `places` decimals.
    pub fn to_fixed(&self, places: u32) -> ServiceResult<String> {
        let value = self
            .to_decimal()?
            .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
        Ok(format!("{:.*}", places as usize, value))
    }
}

/// Currencies known to the client, looked up by symbol.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    registry: HashMap<String, Currency>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            registry: HashMap::new(),
        };
        registry.insert(Currency::Native(NativeCurrency::avax()));
        registry
    }

    /// Registers the DEX tokens whose addresses are configured.
    pub fn from_config(contracts: &ContractsConfig) -> Self {
        let mut registry = Self::new();

        if let Some(address) = parse_optional_address("contracts.party", contracts.party.as_deref())
        {
            registry.insert(Currency::Contract(Token {
                address,
                decimals: 18,
                symbol: "PARTY".to_string(),
                name: "PARTY V2".to_string(),
            }));
        }
        if let Some(address) = parse_optional_address("contracts.yay", contracts.yay.as_deref()) {
            registry.insert(Currency::Contract(Token {
                address,
                decimals: 18,
                symbol: "YAY".to_string(),
                name: "YAY".to_string(),
            }));
        }
        if let Some(address) =
            parse_optional_address("contracts.jacuzzi", contracts.jacuzzi.as_deref())
        {
            registry.insert(Currency::Contract(Token {
                address,
                decimals: 18,
                symbol: "xYAY".to_string(),
                name: "Jacuzzi share".to_string(),
            }));
        }

        registry
    }

    pub fn insert(&mut self, currency: Currency) {
        self.registry
            .insert(currency.symbol().to_uppercase(), currency);
    }

    /// Lookup by symbol, case-insensitive.
    pub fn lookup(&self, symbol: &str) -> Option<&Currency> {
        self.registry.get(&symbol.to_uppercase())
    }

    pub fn find_by_address(&self, address: Address) -> Option<&Currency> {
        self.registry
            .values()
            .find(|currency| currency.address() == Some(address))
    }

    /// Supported symbols, sorted alphabetically.
    pub fn supported_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .registry
            .values()
            .map(|currency| currency.symbol().to_string())
            .collect();
        tokens.sort();
        tokens
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.registry.contains_key(&symbol.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
