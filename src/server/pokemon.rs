//! # Sprite Core - Pokémon Sprite Pipeline
//!
//! The core component does ONE thing: turn a Pokémon id into either its
//! smallest sprite URL or a display-ready bitmap.
//!
//! Publishing the bitmap to devices is left to the caller, which hands the
//! result to [`RelayHub::broadcast_to_devices`](super::hub::RelayHub::broadcast_to_devices).

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::common::config::{DisplayConfig, UpstreamConfig};
use crate::common::messages::{BitmapFrame, Envelope};
use crate::processing::{sprites, ImageFetcher};

/// The slice of a PokéAPI `/pokemon/{id}` response we use.
#[derive(Debug, Clone, Deserialize)]
struct PokemonResponse {
    id: u32,
    name: String,
    /// Nested URL tree; walked generically
    sprites: serde_json::Value,
}

impl PokemonResponse {
    fn front_default(&self) -> Option<&str> {
        self.sprites
            .get("front_default")
            .and_then(serde_json::Value::as_str)
            .filter(|url| !url.trim().is_empty())
    }
}

/// Result of a smallest-sprite lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmallestSprite {
    pub id: u32,
    pub name: String,
    pub url: Option<String>,
}

/// A converted sprite plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PokemonBitmap {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitmap_data: Vec<u8>,
    pub source_url: String,
}

impl PokemonBitmap {
    /// The `bitmap_push` envelope devices expect.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::BitmapPush {
            data: BitmapFrame {
                id: self.id,
                name: self.name.clone(),
                width: self.width,
                height: self.height,
                bitmap_data: self.bitmap_data.clone(),
            },
        }
    }
}

/// Core sprite service: PokéAPI lookups, size probing and bitmap conversion.
pub struct SpriteCore {
    fetcher: ImageFetcher,
    base_url: String,
    display: DisplayConfig,
}

impl SpriteCore {
    /// Create a new core.
    ///
    /// # Example
    /// ```ignore
    /// let core = SpriteCore::new(&config.upstream, config.display)?;
    /// let bitmap = core.get_bitmap(25).await?;
    /// ```
    pub fn new(upstream: &UpstreamConfig, display: DisplayConfig) -> Result<Self> {
        Ok(Self {
            fetcher: ImageFetcher::new(upstream.request_timeout())?,
            base_url: upstream.pokeapi_base_url.trim_end_matches('/').to_string(),
            display,
        })
    }

    async fn lookup(&self, id: u32) -> Result<PokemonResponse> {
        let url = format!("{}/pokemon/{}", self.base_url, id);
        self.fetcher
            .fetch_json(&url)
            .await
            .context("failed to fetch Pokemon")
    }

    /// Find the smallest sprite (by byte size) among all of a Pokémon's sprites.
    ///
    /// # Returns
    /// - `Ok(SmallestSprite)`: `url` is `None` when the Pokémon has no sprites
    /// - `Err`: the metadata lookup failed
    pub async fn get_smallest_sprite(&self, id: u32) -> Result<SmallestSprite> {
        let pokemon = self
            .lookup(id)
            .await
            .map_err(|e| anyhow!("failed to get Pokemon smallest sprite: {:#}", e))?;

        let candidates = sprites::collect_sprite_urls(&pokemon.sprites);
        info!(
            "🔎 Probing {} sprite(s) for #{} ({})",
            candidates.len(),
            pokemon.id,
            pokemon.name
        );
        let url = sprites::select_smallest(&self.fetcher, &candidates).await;

        Ok(SmallestSprite {
            id: pokemon.id,
            name: pokemon.name,
            url,
        })
    }

    /// Fetch a Pokémon's default front sprite and convert it for the display.
    ///
    /// Nothing is published here; on error no partial result exists.
    pub async fn get_bitmap(&self, id: u32) -> Result<PokemonBitmap> {
        let result = async {
            let pokemon = self.lookup(id).await?;
            let source_url = pokemon
                .front_default()
                .ok_or_else(|| anyhow!("no default sprite found for this Pokemon"))?
                .to_string();

            let bitmap = self
                .fetcher
                .fetch_bitmap(&source_url, self.display.max_width, self.display.max_height)
                .await?;

            info!(
                "🖼️  Converted #{} ({}) to {}x{} bitmap ({} bytes)",
                pokemon.id,
                pokemon.name,
                bitmap.width,
                bitmap.height,
                bitmap.data.len()
            );

            Ok::<_, anyhow::Error>(PokemonBitmap {
                id: pokemon.id,
                name: pokemon.name,
                width: bitmap.width,
                height: bitmap.height,
                bitmap_data: bitmap.data,
                source_url,
            })
        };

        result
            .await
            .map_err(|e| anyhow!("failed to get Pokemon bitmap: {:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_front_default() {
        let pokemon: PokemonResponse = serde_json::from_value(json!({
            "id": 25,
            "name": "pikachu",
            "sprites": { "front_default": "https://img/25.png", "back_default": null }
        }))
        .unwrap();
        assert_eq!(pokemon.front_default(), Some("https://img/25.png"));

        let pokemon: PokemonResponse = serde_json::from_value(json!({
            "id": 10001,
            "name": "deoxys-attack",
            "sprites": { "front_default": null }
        }))
        .unwrap();
        assert_eq!(pokemon.front_default(), None);
    }

    #[test]
    fn test_bitmap_envelope() {
        let bitmap = PokemonBitmap {
            id: 1,
            name: "bulbasaur".to_string(),
            width: 16,
            height: 1,
            bitmap_data: vec![0xF0, 0x0F],
            source_url: "https://img/1.png".to_string(),
        };

        let value = serde_json::to_value(bitmap.to_envelope()).unwrap();
        assert_eq!(value["type"], "bitmap_push");
        assert_eq!(value["data"]["name"], "bulbasaur");
        assert_eq!(value["data"]["bitmapData"], json!([240, 15]));
        assert!(value["data"].get("sourceUrl").is_none());

        let value = serde_json::to_value(&bitmap).unwrap();
        assert_eq!(value["sourceUrl"], "https://img/1.png");
    }
}
