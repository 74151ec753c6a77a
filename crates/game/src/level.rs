use glam::Vec2;
use thiserror::Error;

use crate::net::codec::{CodecError, CodecResult};

/// Side length of one block in world units.
pub const BLOCK_SIZE: f32 = 128.0;

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level data truncated")]
    Truncated,
    #[error("level of {width}x{height} blocks needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
    #[error("unknown block value {0:#04x} at index {1}")]
    UnknownBlock(u8, usize),
    #[error("level has no player starts")]
    NoPlayerStarts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    Empty = 0,
    Wall = 1,
    HorizontalWall = 2,
    VerticalWall = 3,
    CornerTopLeft = 4,
    CornerTopRight = 5,
    CornerBottomLeft = 6,
    CornerBottomRight = 7,
    InverseCornerTopLeft = 8,
    InverseCornerTopRight = 9,
    InverseCornerBottomLeft = 10,
    InverseCornerBottomRight = 11,
    PlayerStart = 12,
}

impl BlockKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => BlockKind::Empty,
            1 => BlockKind::Wall,
            2 => BlockKind::HorizontalWall,
            3 => BlockKind::VerticalWall,
            4 => BlockKind::CornerTopLeft,
            5 => BlockKind::CornerTopRight,
            6 => BlockKind::CornerBottomLeft,
            7 => BlockKind::CornerBottomRight,
            8 => BlockKind::InverseCornerTopLeft,
            9 => BlockKind::InverseCornerTopRight,
            10 => BlockKind::InverseCornerBottomLeft,
            11 => BlockKind::InverseCornerBottomRight,
            12 => BlockKind::PlayerStart,
            _ => return None,
        })
    }

    pub fn from_wire(value: u8) -> CodecResult<Self> {
        Self::from_u8(value).ok_or(CodecError::UnknownTag {
            what: "block kind",
            value,
        })
    }

    /// Blocks that stop movement and rays.
    pub fn is_solid(&self) -> bool {
        !matches!(self, BlockKind::Empty | BlockKind::PlayerStart)
    }
}

/// Wall contact for a circle: the offset that resolves the penetration, the
/// surface normal, and whether the circle's center has passed the surface.
#[derive(Debug, Clone, Copy)]
pub struct WallContact {
    pub offset: Vec2,
    pub normal: Vec2,
    pub submerged: bool,
}

impl WallContact {
    fn penetration(&self) -> f32 {
        self.offset.length()
    }
}

/// Immutable block grid loaded once per session. Row-major, `u16` dimensions,
/// one byte per block; the same buffer re-serializes byte for byte.
#[derive(Debug, Clone)]
pub struct Level {
    width: u16,
    height: u16,
    blocks: Vec<BlockKind>,
    player_starts: Vec<usize>,
}

impl Level {
    pub fn from_bytes(data: &[u8]) -> Result<Self, LevelError> {
        if data.len() < 4 {
            return Err(LevelError::Truncated);
        }
        let width = u16::from_be_bytes([data[0], data[1]]);
        let height = u16::from_be_bytes([data[2], data[3]]);
        let expected = width as usize * height as usize;
        let payload = &data[4..];
        if payload.len() != expected {
            return Err(LevelError::SizeMismatch {
                width,
                height,
                expected,
                actual: payload.len(),
            });
        }

        let mut blocks = Vec::with_capacity(expected);
        let mut player_starts = Vec::new();
        for (index, &value) in payload.iter().enumerate() {
            let kind =
                BlockKind::from_u8(value).ok_or(LevelError::UnknownBlock(value, index))?;
            if kind == BlockKind::PlayerStart {
                player_starts.push(index);
            }
            blocks.push(kind);
        }
        Ok(Self {
            width,
            height,
            blocks,
            player_starts,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.blocks.len());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend(self.blocks.iter().map(|b| *b as u8));
        out
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn world_size(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * BLOCK_SIZE,
            self.height as f32 * BLOCK_SIZE,
        )
    }

    /// Block at grid coordinates; everything outside the grid is solid wall.
    pub fn block(&self, x: i32, y: i32) -> BlockKind {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return BlockKind::Wall;
        }
        self.blocks[y as usize * self.width as usize + x as usize]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (i32, i32, BlockKind)> + '_ {
        let width = self.width as i32;
        self.blocks
            .iter()
            .enumerate()
            .map(move |(i, &kind)| (i as i32 % width, i as i32 / width, kind))
    }

    /// Block indices usable as respawn points.
    pub fn player_starts(&self) -> &[usize] {
        &self.player_starts
    }

    pub fn block_center(&self, index: usize) -> Vec2 {
        let x = (index % self.width as usize) as f32;
        let y = (index / self.width as usize) as f32;
        Vec2::new((x + 0.5) * BLOCK_SIZE, (y + 0.5) * BLOCK_SIZE)
    }

    /// Nearest wall contact for a circle, or `None` when the circle is clear.
    /// The deepest contact among all touched blocks wins.
    pub fn collide_circle(&self, center: Vec2, radius: f32) -> Option<WallContact> {
        let min_x = ((center.x - radius) / BLOCK_SIZE).floor() as i32;
        let max_x = ((center.x + radius) / BLOCK_SIZE).floor() as i32;
        let min_y = ((center.y - radius) / BLOCK_SIZE).floor() as i32;
        let max_y = ((center.y + radius) / BLOCK_SIZE).floor() as i32;

        let mut best: Option<WallContact> = None;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let kind = self.block(x, y);
                let cell_min = Vec2::new(x as f32 * BLOCK_SIZE, y as f32 * BLOCK_SIZE);
                let Some(contact) = block_contact(kind, cell_min, center, radius) else {
                    continue;
                };
                let better = match &best {
                    None => true,
                    Some(current) => {
                        (contact.submerged && !current.submerged)
                            || (contact.submerged == current.submerged
                                && contact.penetration() > current.penetration())
                    }
                };
                if better {
                    best = Some(contact);
                }
            }
        }
        best
    }

    /// Length along a normalized ray until the first solid block, capped at
    /// `max_len`. Grid traversal; no entity is consulted.
    pub fn ray_cast(&self, start: Vec2, dir: Vec2, max_len: f32) -> f32 {
        if dir.length_squared() < 1e-6 {
            return max_len;
        }
        let mut cx = (start.x / BLOCK_SIZE).floor() as i32;
        let mut cy = (start.y / BLOCK_SIZE).floor() as i32;
        if self.block(cx, cy).is_solid() {
            return 0.0;
        }

        let step_x: i32 = if dir.x > 0.0 { 1 } else { -1 };
        let step_y: i32 = if dir.y > 0.0 { 1 } else { -1 };
        let t_delta_x = if dir.x != 0.0 {
            BLOCK_SIZE / dir.x.abs()
        } else {
            f32::INFINITY
        };
        let t_delta_y = if dir.y != 0.0 {
            BLOCK_SIZE / dir.y.abs()
        } else {
            f32::INFINITY
        };
        let mut t_max_x = if dir.x > 0.0 {
            ((cx + 1) as f32 * BLOCK_SIZE - start.x) / dir.x
        } else if dir.x < 0.0 {
            (cx as f32 * BLOCK_SIZE - start.x) / dir.x
        } else {
            f32::INFINITY
        };
        let mut t_max_y = if dir.y > 0.0 {
            ((cy + 1) as f32 * BLOCK_SIZE - start.y) / dir.y
        } else if dir.y < 0.0 {
            (cy as f32 * BLOCK_SIZE - start.y) / dir.y
        } else {
            f32::INFINITY
        };

        loop {
            let (entry, advance_x) = if t_max_x < t_max_y {
                (t_max_x, true)
            } else {
                (t_max_y, false)
            };
            if entry >= max_len {
                return max_len;
            }
            if advance_x {
                cx += step_x;
                t_max_x += t_delta_x;
            } else {
                cy += step_y;
                t_max_y += t_delta_y;
            }
            if self.block(cx, cy).is_solid() {
                return entry;
            }
        }
    }

    /// The built-in arena: bordered grid with interior cover, curved corners
    /// and a ring of player starts.
    pub fn arena() -> Self {
        const W: usize = 40;
        const H: usize = 30;
        let mut blocks = vec![BlockKind::Empty; W * H];

        let mut set = |x: usize, y: usize, kind: BlockKind| {
            blocks[y * W + x] = kind;
        };

        for x in 0..W {
            set(x, 0, BlockKind::Wall);
            set(x, H - 1, BlockKind::Wall);
        }
        for y in 0..H {
            set(0, y, BlockKind::Wall);
            set(W - 1, y, BlockKind::Wall);
        }
        set(1, 1, BlockKind::InverseCornerTopLeft);
        set(W - 2, 1, BlockKind::InverseCornerTopRight);
        set(1, H - 2, BlockKind::InverseCornerBottomLeft);
        set(W - 2, H - 2, BlockKind::InverseCornerBottomRight);

        // Central cross of cover.
        for x in 17..23 {
            set(x, 14, BlockKind::HorizontalWall);
            set(x, 15, BlockKind::HorizontalWall);
        }
        for y in 12..18 {
            set(19, y, BlockKind::VerticalWall);
            set(20, y, BlockKind::VerticalWall);
        }

        // Four curved pockets.
        set(8, 7, BlockKind::CornerTopLeft);
        set(9, 7, BlockKind::Wall);
        set(8, 8, BlockKind::Wall);
        set(W - 9, 7, BlockKind::CornerTopRight);
        set(W - 10, 7, BlockKind::Wall);
        set(W - 9, 8, BlockKind::Wall);
        set(8, H - 8, BlockKind::CornerBottomLeft);
        set(9, H - 8, BlockKind::Wall);
        set(8, H - 9, BlockKind::Wall);
        set(W - 9, H - 8, BlockKind::CornerBottomRight);
        set(W - 10, H - 8, BlockKind::Wall);
        set(W - 9, H - 9, BlockKind::Wall);

        for (x, y) in [
            (4, 4),
            (W - 5, 4),
            (4, H - 5),
            (W - 5, H - 5),
            (W / 2, 4),
            (W / 2, H - 5),
        ] {
            set(x, y, BlockKind::PlayerStart);
        }

        let mut out = Vec::with_capacity(4 + W * H);
        out.extend_from_slice(&(W as u16).to_be_bytes());
        out.extend_from_slice(&(H as u16).to_be_bytes());
        out.extend(blocks.iter().map(|b| *b as u8));
        Self::from_bytes(&out).expect("the built-in arena is well-formed")
    }
}

fn block_contact(
    kind: BlockKind,
    cell_min: Vec2,
    center: Vec2,
    radius: f32,
) -> Option<WallContact> {
    const EPSILON: f32 = 1e-4;
    let cell_max = cell_min + Vec2::splat(BLOCK_SIZE);

    match kind {
        BlockKind::Empty | BlockKind::PlayerStart => None,

        BlockKind::Wall => {
            let closest = center.clamp(cell_min, cell_max);
            let delta = center - closest;
            let dist_sq = delta.length_squared();
            if dist_sq > EPSILON {
                let dist = dist_sq.sqrt();
                if dist >= radius {
                    return None;
                }
                let normal = delta / dist;
                Some(WallContact {
                    offset: normal * (radius - dist),
                    normal,
                    submerged: false,
                })
            } else {
                // Center inside the block: push out of the nearest face.
                let faces = [
                    (center.x - cell_min.x, Vec2::new(-1.0, 0.0)),
                    (cell_max.x - center.x, Vec2::new(1.0, 0.0)),
                    (center.y - cell_min.y, Vec2::new(0.0, -1.0)),
                    (cell_max.y - center.y, Vec2::new(0.0, 1.0)),
                ];
                let (depth, normal) = faces
                    .into_iter()
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .expect("faces is not empty");
                Some(WallContact {
                    offset: normal * (depth + radius),
                    normal,
                    submerged: true,
                })
            }
        }

        BlockKind::HorizontalWall => {
            let mid = cell_min.y + BLOCK_SIZE * 0.5;
            let closest = Vec2::new(center.x.clamp(cell_min.x, cell_max.x), mid);
            let delta = center - closest;
            let dist = delta.length();
            if dist >= radius {
                return None;
            }
            let normal = if dist > EPSILON {
                delta / dist
            } else {
                Vec2::new(0.0, -1.0)
            };
            Some(WallContact {
                offset: normal * (radius - dist),
                normal,
                submerged: false,
            })
        }

        BlockKind::VerticalWall => {
            let mid = cell_min.x + BLOCK_SIZE * 0.5;
            let closest = Vec2::new(mid, center.y.clamp(cell_min.y, cell_max.y));
            let delta = center - closest;
            let dist = delta.length();
            if dist >= radius {
                return None;
            }
            let normal = if dist > EPSILON {
                delta / dist
            } else {
                Vec2::new(-1.0, 0.0)
            };
            Some(WallContact {
                offset: normal * (radius - dist),
                normal,
                submerged: false,
            })
        }

        BlockKind::CornerTopLeft
        | BlockKind::CornerTopRight
        | BlockKind::CornerBottomLeft
        | BlockKind::CornerBottomRight => {
            if !inside(center, cell_min, cell_max) {
                return None;
            }
            // Concave quarter arc about the corner diagonally opposite the
            // solid mass; the playable region is the inside of the arc.
            let arc_center = match kind {
                BlockKind::CornerTopLeft => cell_max,
                BlockKind::CornerTopRight => Vec2::new(cell_min.x, cell_max.y),
                BlockKind::CornerBottomLeft => Vec2::new(cell_max.x, cell_min.y),
                _ => cell_min,
            };
            let delta = center - arc_center;
            let dist = delta.length();
            let limit = BLOCK_SIZE - radius;
            if dist <= limit || dist < EPSILON {
                return None;
            }
            let normal = -delta / dist;
            Some(WallContact {
                offset: normal * (dist - limit),
                normal,
                submerged: dist >= BLOCK_SIZE,
            })
        }

        BlockKind::InverseCornerTopLeft
        | BlockKind::InverseCornerTopRight
        | BlockKind::InverseCornerBottomLeft
        | BlockKind::InverseCornerBottomRight => {
            if !inside(center, cell_min, cell_max) {
                return None;
            }
            // Convex quarter arc about the named corner; the playable region
            // is the outside of the arc.
            let arc_center = match kind {
                BlockKind::InverseCornerTopLeft => cell_min,
                BlockKind::InverseCornerTopRight => Vec2::new(cell_max.x, cell_min.y),
                BlockKind::InverseCornerBottomLeft => Vec2::new(cell_min.x, cell_max.y),
                _ => cell_max,
            };
            let delta = center - arc_center;
            let dist = delta.length();
            let limit = BLOCK_SIZE + radius;
            if dist >= limit {
                return None;
            }
            let normal = if dist > EPSILON {
                delta / dist
            } else {
                Vec2::new(1.0, 0.0)
            };
            Some(WallContact {
                offset: normal * (limit - dist),
                normal,
                submerged: dist <= BLOCK_SIZE - radius,
            })
        }
    }
}

fn inside(point: Vec2, min: Vec2, max: Vec2) -> bool {
    point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
}
