/// Key bindings: terminal keys to configuration edits and camera input
use cadium_core::{Color, Configuration};
use crossterm::event::KeyCode;

/// Model colors cycled with `c`
const MODEL_COLORS: [u32; 5] = [0xC8C8C8, 0xFF6B6B, 0x4ECDC4, 0xFFD93D, 0x6C5CE7];
/// Backgrounds cycled with `b`
const BACKGROUNDS: [u32; 4] = [0x000000, 0x1E1E1E, 0x263238, 0xFFFFFF];

const ROTATION_STEP_DEG: f32 = 15.0;
const POSITION_STEP: f32 = 0.5;
const SCALE_STEP: f32 = 0.1;
const INTENSITY_STEP: f32 = 0.1;
const ORBIT_STEP: f32 = 0.1;

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    /// The configuration was edited in place
    Configure,
    Orbit { left: f32, up: f32 },
    Dolly(f32),
    ToggleAutoRotate,
    Screenshot,
    Quit,
    Ignored,
}

fn cycle(current: Color, palette: &[u32]) -> Color {
    let next = palette
        .iter()
        .position(|&hex| Color::from_hex_u32(hex) == current)
        .map_or(0, |i| (i + 1) % palette.len());
    Color::from_hex_u32(palette[next])
}

fn step(value: &mut f32, delta: f32, (min, max): (f32, f32)) {
    *value = (*value + delta).clamp(min, max);
}

/// Apply `code` to `config` and report what else the caller has to do.
pub fn apply_key(config: &mut Configuration, code: KeyCode) -> KeyAction {
    let intensity = Configuration::INTENSITY_RANGE;
    let free = (f32::MIN, f32::MAX);

    match code {
        KeyCode::Char('q') | KeyCode::Esc => return KeyAction::Quit,
        KeyCode::Char('p') => return KeyAction::Screenshot,
        KeyCode::Char('t') => return KeyAction::ToggleAutoRotate,
        KeyCode::Left => return KeyAction::Orbit { left: ORBIT_STEP, up: 0.0 },
        KeyCode::Right => return KeyAction::Orbit { left: -ORBIT_STEP, up: 0.0 },
        KeyCode::Up => return KeyAction::Orbit { left: 0.0, up: ORBIT_STEP },
        KeyCode::Down => return KeyAction::Orbit { left: 0.0, up: -ORBIT_STEP },
        KeyCode::PageUp => return KeyAction::Dolly(0.9),
        KeyCode::PageDown => return KeyAction::Dolly(1.1),

        KeyCode::Char('f') => config.wireframe = !config.wireframe,
        KeyCode::Char('g') => config.show_grid = !config.show_grid,
        KeyCode::Char('x') => config.show_axes = !config.show_axes,
        KeyCode::Char('c') => config.color = cycle(config.color, &MODEL_COLORS),
        KeyCode::Char('b') => config.background_color = cycle(config.background_color, &BACKGROUNDS),

        KeyCode::Char('+') | KeyCode::Char('=') => step(&mut config.scale, SCALE_STEP, Configuration::SCALE_RANGE),
        KeyCode::Char('-') => step(&mut config.scale, -SCALE_STEP, Configuration::SCALE_RANGE),
        KeyCode::Char(']') => step(&mut config.ambient_intensity, INTENSITY_STEP, intensity),
        KeyCode::Char('[') => step(&mut config.ambient_intensity, -INTENSITY_STEP, intensity),
        KeyCode::Char('}') => step(&mut config.directional_intensity, INTENSITY_STEP, intensity),
        KeyCode::Char('{') => step(&mut config.directional_intensity, -INTENSITY_STEP, intensity),

        // Model rotation, WASD plus E/R for roll
        KeyCode::Char('w') => step(&mut config.rotation.x, -ROTATION_STEP_DEG, free),
        KeyCode::Char('s') => step(&mut config.rotation.x, ROTATION_STEP_DEG, free),
        KeyCode::Char('a') => step(&mut config.rotation.y, -ROTATION_STEP_DEG, free),
        KeyCode::Char('d') => step(&mut config.rotation.y, ROTATION_STEP_DEG, free),
        KeyCode::Char('e') => step(&mut config.rotation.z, ROTATION_STEP_DEG, free),
        KeyCode::Char('r') => step(&mut config.rotation.z, -ROTATION_STEP_DEG, free),

        KeyCode::Char('j') => step(&mut config.position.x, -POSITION_STEP, free),
        KeyCode::Char('l') => step(&mut config.position.x, POSITION_STEP, free),
        KeyCode::Char('i') => step(&mut config.position.y, POSITION_STEP, free),
        KeyCode::Char('k') => step(&mut config.position.y, -POSITION_STEP, free),
        KeyCode::Char('u') => step(&mut config.position.z, -POSITION_STEP, free),
        KeyCode::Char('o') => step(&mut config.position.z, POSITION_STEP, free),

        KeyCode::Char('0') => *config = Configuration::default(),
        _ => return KeyAction::Ignored,
    }
    KeyAction::Configure
}

pub const HELP: &str = "f=wire g=grid x=axes c/b=colors +/-=scale [ ]/{ }=light WASD/ER=rotate IJKL/UO=move arrows=orbit t=spin p=shot q=quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_and_cycles() {
        let mut config = Configuration::default();
        assert_eq!(apply_key(&mut config, KeyCode::Char('f')), KeyAction::Configure);
        assert!(config.wireframe);

        apply_key(&mut config, KeyCode::Char('c'));
        assert_eq!(config.color, Color::from_hex_u32(0xFF6B6B));
        for _ in 0..4 {
            apply_key(&mut config, KeyCode::Char('c'));
        }
        assert_eq!(config.color, Color::from_hex_u32(0xC8C8C8));
    }

    #[test]
    fn test_ranges_are_clamped() {
        let mut config = Configuration::default();
        for _ in 0..100 {
            apply_key(&mut config, KeyCode::Char('+'));
            apply_key(&mut config, KeyCode::Char(']'));
        }
        assert_eq!(config.scale, 3.0);
        assert_eq!(config.ambient_intensity, 5.0);

        for _ in 0..100 {
            apply_key(&mut config, KeyCode::Char('-'));
        }
        assert_eq!(config.scale, 0.5);
    }

    #[test]
    fn test_rotation_in_degrees() {
        let mut config = Configuration::default();
        apply_key(&mut config, KeyCode::Char('d'));
        apply_key(&mut config, KeyCode::Char('d'));
        assert_eq!(config.rotation.y, 30.0);
    }

    #[test]
    fn test_camera_keys_leave_config_alone() {
        let mut config = Configuration::default();
        assert_eq!(
            apply_key(&mut config, KeyCode::Left),
            KeyAction::Orbit { left: 0.1, up: 0.0 }
        );
        assert_eq!(apply_key(&mut config, KeyCode::Char('q')), KeyAction::Quit);
        assert_eq!(apply_key(&mut config, KeyCode::F(5)), KeyAction::Ignored);
        assert_eq!(config, Configuration::default());
    }
}
