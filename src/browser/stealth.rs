use rand::Rng;
use std::collections::BTreeMap;

use crate::config::Viewport;

#[derive(Debug, Clone)]
pub struct StealthConfig {
    pub randomize_user_agents: bool,
    pub fingerprint_randomization: bool,
    pub mask_automation: bool,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            randomize_user_agents: true,
            fingerprint_randomization: true,
            mask_automation: true,
        }
    }
}

impl StealthConfig {
    /// Chromium flags for the anti-detection launch profile.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-software-rasterizer",
            "--disable-extensions",
            "--disable-blink-features=AutomationControlled",
            "--disable-web-security",
            "--disable-features=IsolateOrigins,site-per-process",
            "--ignore-certificate-errors",
            "--no-first-run",
            "--no-service-autorun",
            "--password-store=basic",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.fingerprint_randomization {
            args.extend(
                ["--disable-canvas-aa", "--disable-2d-canvas-clip-aa"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        args
    }
}

pub struct UserAgentGenerator {
    user_agents: Vec<String>,
}

impl Default for UserAgentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentGenerator {
    pub fn new() -> Self {
        let user_agents = vec![
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36".to_string(),
        ];

        Self { user_agents }
    }

    pub fn random_user_agent(&self) -> &str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.user_agents.len());
        &self.user_agents[index]
    }

    pub fn default_user_agent(&self) -> &str {
        &self.user_agents[0]
    }
}

pub struct FingerprintRandomizer {
    languages: Vec<String>,
    timezones: Vec<String>,
}

impl Default for FingerprintRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintRandomizer {
    pub fn new() -> Self {
        let languages = vec![
            "en-US,en;q=0.9".to_string(),
            "en-GB,en;q=0.9".to_string(),
            "en-CA,en;q=0.9".to_string(),
        ];

        let timezones = vec![
            "America/Los_Angeles".to_string(),
            "America/New_York".to_string(),
            "America/Chicago".to_string(),
            "Europe/London".to_string(),
        ];

        Self { languages, timezones }
    }

    /// Viewport is pinned by configuration; everything else may vary.
    pub fn generate_fingerprint(&self, viewport: Viewport, randomize: bool) -> BrowserFingerprint {
        if !randomize {
            return BrowserFingerprint {
                viewport,
                language: self.languages[0].clone(),
                timezone: self.timezones[0].clone(),
                platform: "MacIntel".to_string(),
                hardware_concurrency: 8,
                device_memory: 8,
            };
        }

        let mut rng = rand::thread_rng();
        let platforms = ["Win32", "MacIntel", "Linux x86_64"];
        let memory_options = [4, 8, 16];

        BrowserFingerprint {
            viewport,
            language: self.languages[rng.gen_range(0..self.languages.len())].clone(),
            timezone: self.timezones[rng.gen_range(0..self.timezones.len())].clone(),
            platform: platforms[rng.gen_range(0..platforms.len())].to_string(),
            hardware_concurrency: rng.gen_range(4..=16),
            device_memory: memory_options[rng.gen_range(0..memory_options.len())],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserFingerprint {
    pub viewport: Viewport,
    pub language: String,
    pub timezone: String,
    pub platform: String,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
}

impl BrowserFingerprint {
    pub fn primary_language(&self) -> &str {
        self.language.split(',').next().unwrap_or("en-US")
    }

    pub fn to_js_overrides(&self) -> BTreeMap<String, String> {
        let mut overrides = BTreeMap::new();

        overrides.insert("language".to_string(), format!("'{}'", self.primary_language()));
        overrides.insert(
            "languages".to_string(),
            format!("['{}', 'en']", self.primary_language()),
        );
        overrides.insert("platform".to_string(), format!("'{}'", self.platform));
        overrides.insert(
            "hardwareConcurrency".to_string(),
            self.hardware_concurrency.to_string(),
        );
        overrides.insert("deviceMemory".to_string(), self.device_memory.to_string());

        overrides
    }
}

pub fn generate_stealth_script(fingerprint: &BrowserFingerprint) -> String {
    let mut script = String::from(
        r#"
    // stealth script to avoid detection
    (function() {
        // override navigator properties
    "#,
    );

    for (property, value) in fingerprint.to_js_overrides() {
        script.push_str(&format!(
            "        Object.defineProperty(navigator, '{}', {{ get: () => {} }});\n",
            property, value
        ));
    }

    script.push_str(
        r#"
        // Hide webdriver property
        Object.defineProperty(navigator, 'webdriver', { get: () => undefined });

        // Override plugins
        Object.defineProperty(navigator, 'plugins', {
            get: () => [
                { name: 'Chrome PDF Plugin', description: 'Portable Document Format' },
                { name: 'Chrome PDF Viewer', description: 'PDF Viewer' },
                { name: 'Native Client', description: 'Native Client' }
            ]
        });

        // Chrome runtime shape expected by fingerprinting scripts
        window.chrome = window.chrome || { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };

        // Override permissions
        const originalQuery = navigator.permissions.query;
        navigator.permissions.query = function(parameters) {
            return parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery.call(this, parameters);
        };

        // Hide automation indicators
        delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
        delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
        delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    })();
    "#,
    );

    script
}
