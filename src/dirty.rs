use crate::error::{CloudscapeError, Result};
use crate::settings::{NoiseTier, CHANNEL_COUNT};

/// A unit of regeneration work with its own dirty flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenerationKey {
    Terrain,
    Noise { tier: NoiseTier, channel: usize },
    /// Light, volume render parameters and clip planes: cheap uniform uploads.
    RenderParams,
}

impl GenerationKey {
    /// Noise key for a channel that is known to exist.
    pub fn noise(tier: NoiseTier, channel: usize) -> Result<Self> {
        if channel >= CHANNEL_COUNT {
            return Err(CloudscapeError::invalid(format!(
                "channel {} out of range, volumes have {} channels",
                channel, CHANNEL_COUNT
            )));
        }
        Ok(GenerationKey::Noise { tier, channel })
    }

    /// Every key, in the order the orchestration step visits them.
    pub fn all() -> impl Iterator<Item = GenerationKey> {
        std::iter::once(GenerationKey::Terrain)
            .chain(NoiseTier::ALL.into_iter().flat_map(|tier| {
                (0..CHANNEL_COUNT).map(move |channel| GenerationKey::Noise { tier, channel })
            }))
            .chain(std::iter::once(GenerationKey::RenderParams))
    }
}

/// Stale-data flags, set by configuration changes and cleared once the
/// corresponding regeneration succeeded. A `Noise` key past the last channel
/// is rejected by `mark` and `clear` and is never dirty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyTracker {
    terrain: bool,
    noise: [[bool; CHANNEL_COUNT]; 2],
    render_params: bool,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag_mut(&mut self, key: GenerationKey) -> Result<&mut bool> {
        match key {
            GenerationKey::Terrain => Ok(&mut self.terrain),
            GenerationKey::Noise { tier, channel } => {
                GenerationKey::noise(tier, channel)?;
                Ok(&mut self.noise[tier.index()][channel])
            }
            GenerationKey::RenderParams => Ok(&mut self.render_params),
        }
    }

    pub fn mark(&mut self, key: GenerationKey) -> Result<()> {
        *self.flag_mut(key)? = true;
        Ok(())
    }

    pub fn clear(&mut self, key: GenerationKey) -> Result<()> {
        *self.flag_mut(key)? = false;
        Ok(())
    }

    pub fn mark_render_params(&mut self) {
        self.render_params = true;
    }

    pub fn is_dirty(&self, key: GenerationKey) -> bool {
        match key {
            GenerationKey::Terrain => self.terrain,
            GenerationKey::Noise { tier, channel } => self.noise[tier.index()].get(channel).copied().unwrap_or(false),
            GenerationKey::RenderParams => self.render_params,
        }
    }

    pub fn mark_tier(&mut self, tier: NoiseTier) {
        self.noise[tier.index()] = [true; CHANNEL_COUNT];
    }

    pub fn mark_all(&mut self) {
        self.terrain = true;
        self.noise = [[true; CHANNEL_COUNT]; 2];
        self.render_params = true;
    }

    pub fn any(&self) -> bool {
        GenerationKey::all().any(|key| self.is_dirty(key))
    }

    pub fn dirty_keys(&self) -> Vec<GenerationKey> {
        GenerationKey::all().filter(|&key| self.is_dirty(key)).collect()
    }
}
