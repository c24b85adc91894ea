use colored::Color;

pub const PRIMARY: Color = Color::TrueColor {
    r: 0x8a,
    g: 0xe2,
    b: 0x34,
};
pub const ACCENT: Color = Color::TrueColor {
    r: 0xfc,
    g: 0xe9,
    b: 0x4f,
};
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const SERVICE: Color = Color::BrightMagenta;
pub const DOMAIN: Color = Color::BrightCyan;
