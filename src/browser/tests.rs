use uuid::Uuid;

use crate::browser::chrome::profile_dir;
use crate::browser::stealth::generate_stealth_script;
use crate::browser::{FingerprintRandomizer, LaunchOptions, StealthConfig, UserAgentGenerator};
use crate::config::{AuthCookie, BackendKind, Credentials, ResearchSite, ScraperConfig, Viewport};

fn gemini_config() -> ScraperConfig {
    let mut config = ScraperConfig::new(
        ResearchSite::Gemini,
        Some(Credentials {
            email: "researcher@example.com".to_string(),
            password: "hunter2".to_string(),
            two_factor_code: None,
        }),
    )
    .unwrap();
    config.viewport = Viewport { width: 1280, height: 800 };
    config.auth_cookies.push(AuthCookie {
        name: "SID".to_string(),
        value: "abc".to_string(),
        domain: ".google.com".to_string(),
        path: None,
    });
    config
}

#[test]
fn test_stealth_config_default() {
    let config = StealthConfig::default();

    assert!(config.randomize_user_agents);
    assert!(config.fingerprint_randomization);
    assert!(config.mask_automation);
}

#[test]
fn test_stealth_launch_args_hide_automation() {
    let args = StealthConfig::default().launch_args();

    assert!(args.iter().any(|a| a == "--disable-blink-features=AutomationControlled"));
    assert!(args.iter().any(|a| a == "--disable-canvas-aa"));

    let plain = StealthConfig {
        fingerprint_randomization: false,
        ..StealthConfig::default()
    }
    .launch_args();
    assert!(!plain.iter().any(|a| a == "--disable-canvas-aa"));
}

#[test]
fn test_user_agent_generation() {
    let generator = UserAgentGenerator::new();
    let user_agent = generator.random_user_agent();

    assert!(!user_agent.is_empty(), "User agent should not be empty");
    assert!(user_agent.contains("Mozilla"), "User agent should contain Mozilla");
    assert!(generator.default_user_agent().contains("Chrome/"));
}

#[test]
fn test_fingerprint_keeps_configured_viewport() {
    let randomizer = FingerprintRandomizer::new();
    let viewport = Viewport { width: 1366, height: 768 };

    for randomize in [true, false] {
        let fingerprint = randomizer.generate_fingerprint(viewport, randomize);
        assert_eq!(fingerprint.viewport, viewport);
        assert!(!fingerprint.language.is_empty(), "Language should not be empty");
        assert!(!fingerprint.timezone.is_empty(), "Timezone should not be empty");
        assert!(fingerprint.hardware_concurrency > 0, "Hardware concurrency should be positive");
        assert!(fingerprint.device_memory > 0, "Device memory should be positive");
    }
}

#[test]
fn test_fixed_fingerprint_is_deterministic() {
    let randomizer = FingerprintRandomizer::new();
    let a = randomizer.generate_fingerprint(Viewport::default(), false);
    let b = randomizer.generate_fingerprint(Viewport::default(), false);

    assert_eq!(a.platform, b.platform);
    assert_eq!(a.language, b.language);
    assert_eq!(a.primary_language(), "en-US");
}

#[test]
fn test_stealth_script_generation() {
    let randomizer = FingerprintRandomizer::new();
    let fingerprint = randomizer.generate_fingerprint(Viewport::default(), false);
    let script = generate_stealth_script(&fingerprint);

    assert!(script.contains("navigator"), "Script should modify navigator properties");
    assert!(script.contains("webdriver"), "Script should hide webdriver property");
    assert!(script.contains("'hardwareConcurrency', { get: () => 8 }"));
    assert!(script.contains("'platform', { get: () => 'MacIntel' }"));
}

#[test]
fn test_stealth_backend_launch_options() {
    let config = gemini_config();
    let options = LaunchOptions::for_backend(BackendKind::Stealth, &config);

    assert!(options.stealth.is_some());
    assert!(options.headless);
    assert_eq!(options.cookies.len(), 1);
    assert!(options.args.iter().any(|a| a == "--window-size=1280,800"));
    assert!(options.args.iter().any(|a| a == "--disable-blink-features=AutomationControlled"));
}

#[test]
fn test_devtools_backend_launch_options() {
    let config = gemini_config();
    let options = LaunchOptions::for_backend(BackendKind::Devtools, &config);

    assert!(options.stealth.is_none());
    assert!(options.cookies.is_empty());
    assert_eq!(
        options.args,
        vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1280,800".to_string(),
        ]
    );
    assert_eq!(options.navigation_timeout, config.navigation_timeout);
}

#[test]
fn test_profile_dir_is_removed_on_drop() {
    let id = Uuid::new_v4();
    let profile = profile_dir(id).unwrap();
    let path = profile.path().to_path_buf();

    assert!(path.is_dir());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(&format!("deep-research-{}-", id.simple())), "{}", name);

    drop(profile);
    assert!(!path.exists());
}

#[test]
fn test_profile_dirs_are_unique_per_launch() {
    let first = profile_dir(Uuid::new_v4()).unwrap();
    let second = profile_dir(Uuid::new_v4()).unwrap();
    assert_ne!(first.path(), second.path());
}
