use std::time::Duration;

use padflow_control::{
    ConfigError, ControlConfiguration, ControlKind, ControllerConfiguration, ControllerLayout,
    Fingerprint,
};

use crate::document::{
    decode_f32, encode_f32, BindingV1, ControlEntryV1, DeadZoneV1, DocumentV1, Versioned,
    CURRENT_VERSION,
};
use crate::{Result, StoreError};

/// Parses a configuration document for `layout`.
///
/// The document must carry the layout's fingerprint and list its controls
/// in order. Every value goes through the validated setters.
pub fn parse_configuration(input: &str, layout: &ControllerLayout) -> Result<ControllerConfiguration> {
    let version = parse_version(input)?;
    match version {
        1 => {
            let document: DocumentV1 = serde_yaml::from_str(input)?;
            document.into_configuration(layout)
        }
        _ => Err(StoreError::UnsupportedVersion(version)),
    }
}

/// Renders `config` as a document for `layout`.
pub fn render_configuration(
    config: &ControllerConfiguration,
    layout: &ControllerLayout,
) -> Result<String> {
    config.ensure_matches(layout)?;
    let controls = layout
        .controls()
        .iter()
        .zip(config.iter())
        .map(|(control, (_, cfg))| ControlEntryV1::from_config(control.name(), control.kind(), cfg))
        .collect();
    let document = DocumentV1 {
        version: CURRENT_VERSION,
        controller: layout.name().to_owned(),
        fingerprint: layout.fingerprint().to_string(),
        controls,
    };
    Ok(serde_yaml::to_string(&document)?)
}

fn parse_version(input: &str) -> Result<u8> {
    let raw: Versioned = serde_yaml::from_str(input)?;
    Ok(raw.version)
}

impl DocumentV1 {
    fn into_configuration(self, layout: &ControllerLayout) -> Result<ControllerConfiguration> {
        let fingerprint: Fingerprint = self
            .fingerprint
            .parse()
            .map_err(|_| StoreError::BadFingerprint(self.fingerprint.clone()))?;
        if fingerprint != layout.fingerprint() {
            return Err(ConfigError::FingerprintMismatch {
                expected: layout.fingerprint(),
                actual: fingerprint,
            }
            .into());
        }
        if self.controls.len() != layout.len() {
            return Err(StoreError::ControlCount {
                expected: layout.len(),
                found: self.controls.len(),
            });
        }

        let mut config = ControllerConfiguration::new(layout);
        for (index, (control, entry)) in layout.controls().iter().zip(self.controls).enumerate() {
            let kind: ControlKind = entry
                .kind
                .parse()
                .map_err(|_| StoreError::UnknownKind(entry.kind.clone()))?;
            if entry.name != control.name() || kind != control.kind() {
                return Err(StoreError::ControlMismatch {
                    index,
                    expected: format!("{} ({})", control.name(), control.kind()),
                    found: format!("{} ({})", entry.name, entry.kind),
                });
            }
            entry.apply(config.control_mut(control.index())?)?;
        }
        Ok(config)
    }
}

impl ControlEntryV1 {
    fn from_config(name: &str, kind: ControlKind, cfg: &ControlConfiguration) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.as_str().to_owned(),
            dead_zone: cfg.dead_zone().map(|dz| DeadZoneV1 {
                lower: encode_f32(dz.lower()),
                upper: encode_f32(dz.upper()),
            }),
            granularity: cfg.granularity().map(encode_f32),
            center: (cfg.center().to_bits() != 0).then(|| encode_f32(cfg.center())),
            inverted: cfg.is_inverted(),
            turbo: cfg.is_turbo_enabled(),
            turbo_delay_ms: u64::try_from(cfg.turbo_delay().as_millis()).unwrap_or(u64::MAX),
            user_id: cfg.user_id(),
            bindings: cfg
                .bindings()
                .iter()
                .map(|b| BindingV1 {
                    value: encode_f32(b.value),
                    id: b.id,
                })
                .collect(),
        }
    }

    fn apply(self, cfg: &mut ControlConfiguration) -> Result<()> {
        if let Some(dz) = &self.dead_zone {
            cfg.set_dead_zone(
                decode_f32("dead_zone.lower", &dz.lower)?,
                decode_f32("dead_zone.upper", &dz.upper)?,
            )?;
        }
        if let Some(granularity) = &self.granularity {
            cfg.set_granularity(decode_f32("granularity", granularity)?)?;
        }
        if let Some(center) = &self.center {
            cfg.set_center(decode_f32("center", center)?)?;
        }
        cfg.set_inverted(self.inverted);
        cfg.set_turbo_enabled(self.turbo);
        cfg.set_turbo_delay(Duration::from_millis(self.turbo_delay_ms));
        cfg.set_user_id(self.user_id);
        for binding in &self.bindings {
            cfg.bind_value(decode_f32("bindings.value", &binding.value)?, binding.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use padflow_control::ControlIndex;

    use super::*;

    fn layout() -> ControllerLayout {
        ControllerLayout::builder("Demo Pad")
            .axis("stick x")
            .button("fire")
            .build()
    }

    fn tuned(layout: &ControllerLayout) -> ControllerConfiguration {
        let mut config = ControllerConfiguration::new(layout);
        let stick = config.control_mut(ControlIndex(0)).unwrap();
        stick.set_dead_zone(-0.05, 0.05).unwrap();
        stick.set_granularity(0.1).unwrap();
        stick.set_center(-1.0 / 3.0).unwrap();
        stick.set_user_id(42);
        let fire = config.control_mut(ControlIndex(1)).unwrap();
        fire.set_inverted(true);
        fire.set_turbo_enabled(true);
        fire.set_turbo_delay(Duration::from_millis(120));
        fire.bind_value(1.0, 7).unwrap();
        fire.bind_value(0.0, -3).unwrap();
        config
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let layout = layout();
        let config = tuned(&layout);
        let yaml = render_configuration(&config, &layout).unwrap();
        let parsed = parse_configuration(&yaml, &layout).unwrap();
        assert_eq!(parsed, config);
        let center = parsed.control(ControlIndex(0)).unwrap().center();
        assert_eq!(center.to_bits(), (-1.0f32 / 3.0).to_bits());
    }

    #[test]
    fn rendered_floats_are_hex() {
        let layout = layout();
        let yaml = render_configuration(&tuned(&layout), &layout).unwrap();
        assert!(yaml.contains("version: 1"));
        assert!(yaml.contains("0x3dcccccd"));
        assert!(yaml.contains(&layout.fingerprint().to_string()));
    }

    #[test]
    fn fingerprint_mismatch_is_rejected() {
        let layout = layout();
        let other = ControllerLayout::builder("Demo Pad")
            .axis("stick x")
            .hat("fire")
            .build();
        let yaml = render_configuration(&tuned(&layout), &layout).unwrap();
        assert!(matches!(
            parse_configuration(&yaml, &other),
            Err(StoreError::Config(ConfigError::FingerprintMismatch { .. }))
        ));
    }

    #[test]
    fn unsupported_version() {
        let yaml = "version: 2\ncontroller: x\nfingerprint: '00'\n";
        assert!(matches!(
            parse_configuration(yaml, &layout()),
            Err(StoreError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn missing_version_is_a_yaml_error() {
        assert!(matches!(
            parse_configuration("controls: []\n", &layout()),
            Err(StoreError::Yaml(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let layout = layout();
        let header = format!("version: 1\ncontroller: Demo Pad\nfingerprint: '{}'\n", layout.fingerprint());

        let bad_float = format!(
            "{header}controls:\n  - name: stick x\n    kind: axis\n    granularity: '0.1'\n  - name: fire\n    kind: button\n"
        );
        assert!(matches!(
            parse_configuration(&bad_float, &layout),
            Err(StoreError::BadFloat { field: "granularity", .. })
        ));

        let out_of_range = format!(
            "{header}controls:\n  - name: stick x\n    kind: axis\n    center: '0x3f800000'\n  - name: fire\n    kind: button\n"
        );
        assert!(matches!(
            parse_configuration(&out_of_range, &layout),
            Err(StoreError::Config(ConfigError::OutOfOpenRange { .. }))
        ));

        let renamed = format!(
            "{header}controls:\n  - name: stick y\n    kind: axis\n  - name: fire\n    kind: button\n"
        );
        assert!(matches!(
            parse_configuration(&renamed, &layout),
            Err(StoreError::ControlMismatch { index: 0, .. })
        ));

        let unknown_kind = format!(
            "{header}controls:\n  - name: stick x\n    kind: slider\n  - name: fire\n    kind: button\n"
        );
        assert!(matches!(
            parse_configuration(&unknown_kind, &layout),
            Err(StoreError::UnknownKind(_))
        ));

        let short = format!("{header}controls:\n  - name: stick x\n    kind: axis\n");
        assert!(matches!(
            parse_configuration(&short, &layout),
            Err(StoreError::ControlCount { expected: 2, found: 1 })
        ));
    }
}
