//! Navigator/property masking init scripts
//!
//! Injected via `Page.addScriptToEvaluateOnNewDocument` on every page when
//! `stealth=true`, before first navigation. Order matters: the config
//! object must exist before any evasion reads it.

mod config;

use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use tracing::debug;

pub use config::StealthConfig;

const NAVIGATOR_WEBDRIVER: &str = r#"
(() => {
  try {
    Object.defineProperty(Navigator.prototype, 'webdriver', {
      get: () => undefined,
      configurable: true,
    });
  } catch (e) {}
})();
"#;

const NAVIGATOR_PROPS: &str = r#"
(() => {
  const fp = window.__relayFp || {};
  const define = (name, value) => {
    try {
      Object.defineProperty(Navigator.prototype, name, {
        get: () => value,
        configurable: true,
      });
    } catch (e) {}
  };
  if (fp.vendor) define('vendor', fp.vendor);
  if (fp.platform) define('platform', fp.platform);
  if (fp.language) define('language', fp.language);
  if (fp.languages) define('languages', Object.freeze(fp.languages.slice()));
  if (fp.hardwareConcurrency) define('hardwareConcurrency', fp.hardwareConcurrency);
})();
"#;

const NAVIGATOR_PLUGINS: &str = r#"
(() => {
  try {
    const fakePlugins = [
      { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
      { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    ];
    Object.defineProperty(Navigator.prototype, 'plugins', {
      get: () => {
        const arr = fakePlugins.slice();
        arr.item = (i) => arr[i] || null;
        arr.namedItem = (n) => arr.find((p) => p.name === n) || null;
        arr.refresh = () => {};
        return arr;
      },
      configurable: true,
    });
  } catch (e) {}
})();
"#;

const CHROME_RUNTIME: &str = r#"
(() => {
  if (!window.chrome) {
    try {
      Object.defineProperty(window, 'chrome', {
        value: { runtime: {}, loadTimes: () => ({}), csi: () => ({}) },
        writable: true,
        configurable: true,
      });
    } catch (e) {}
  }
})();
"#;

const WEBGL_VENDOR: &str = r#"
(() => {
  const fp = window.__relayFp || {};
  if (!fp.webglVendor) return;
  const patch = (proto) => {
    const orig = proto.getParameter;
    proto.getParameter = function (param) {
      if (param === 37445) return fp.webglVendor;
      if (param === 37446) return fp.webglRenderer;
      return orig.call(this, param);
    };
  };
  try {
    if (window.WebGLRenderingContext) patch(WebGLRenderingContext.prototype);
    if (window.WebGL2RenderingContext) patch(WebGL2RenderingContext.prototype);
  } catch (e) {}
})();
"#;

const CANVAS_NOISE: &str = r#"
(() => {
  const fp = window.__relayFp || {};
  if (!fp.sessionSeed) return;
  // Deterministic per-session noise: same seed, same pixels.
  let seed = 0;
  for (const ch of fp.sessionSeed) seed = (seed * 31 + ch.charCodeAt(0)) >>> 0;
  const rand = () => {
    seed = (seed * 1664525 + 1013904223) >>> 0;
    return seed / 4294967296;
  };
  try {
    const orig = HTMLCanvasElement.prototype.toDataURL;
    HTMLCanvasElement.prototype.toDataURL = function (...args) {
      try {
        const ctx = this.getContext('2d');
        if (ctx && this.width > 0 && this.height > 0) {
          const data = ctx.getImageData(0, 0, 1, 1);
          data.data[0] = (data.data[0] + Math.floor(rand() * 2)) % 256;
          ctx.putImageData(data, 0, 0);
        }
      } catch (e) {}
      return orig.apply(this, args);
    };
  } catch (e) {}
})();
"#;

/// Evasion scripts in injection order. The config object is installed
/// separately, first.
const EVASION_SCRIPTS: &[(&str, &str)] = &[
    ("navigator_webdriver", NAVIGATOR_WEBDRIVER),
    ("navigator_props", NAVIGATOR_PROPS),
    ("navigator_plugins", NAVIGATOR_PLUGINS),
    ("chrome_runtime", CHROME_RUNTIME),
    ("webgl_vendor", WEBGL_VENDOR),
    ("canvas_noise", CANVAS_NOISE),
];

/// Register the stealth init scripts on a page. Must run while the page is
/// still blank; the scripts take effect from the next document onward.
pub async fn inject(page: &Page, config: &StealthConfig) -> Result<()> {
    debug!("injecting {} stealth scripts", EVASION_SCRIPTS.len() + 1);

    let fp_json = serde_json::to_string(config)?;
    let bootstrap = format!("window.__relayFp = {fp_json};");
    add_init_script(page, &bootstrap).await?;

    for (name, source) in EVASION_SCRIPTS {
        if let Err(e) = add_init_script(page, source).await {
            // Best effort: a single failed evasion should not break the page.
            tracing::warn!("stealth script {name} failed to register: {e}");
        }
    }
    Ok(())
}

async fn add_init_script(page: &Page, source: &str) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams {
        source: source.to_string(),
        include_command_line_api: None,
        world_name: None,
        run_immediately: None,
    })
    .await?;
    Ok(())
}
