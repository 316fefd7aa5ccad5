/*!
 * Shared helpers for integration tests: a fully wired orchestrator backed
 * by the mock backend, plus sample subtitle files in a temp directory.
 */

use std::path::PathBuf;
use std::sync::Arc;

use subtran::app_config::Config;
use subtran::backends::TranslationBackend;
use subtran::backends::mock::MockBackend;
use subtran::cache::TranslationCache;
use subtran::cancellation::CancellationToken;
use subtran::glossary::GlossaryStore;
use subtran::pipeline::{Orchestrator, Scheduler};
use subtran::progress::LogReporter;

/// Everything an end-to-end test needs, kept alive together
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub backend: Arc<MockBackend>,
    pub cache: Arc<TranslationCache>,
    pub glossary: Arc<GlossaryStore>,
    pub token: CancellationToken,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestHarness {
    /// Harness with a working mock backend and default config
    pub fn new() -> Self {
        Self::with_backend_and_config(MockBackend::working(), Config::default_config())
    }

    /// Harness with a custom mock and config
    pub fn with_backend_and_config(backend: Arc<MockBackend>, config: Config) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir().expect("temp dir");
        let cache = Arc::new(TranslationCache::new_in_memory());
        let glossary = Arc::new(GlossaryStore::new(dir.path().join("glossaries")));
        let scheduler = Arc::new(Scheduler::new(
            config.max_parallelism,
            config.translation.srt_batch_size,
            config.translation.ass_batch_size,
        ));
        let token = CancellationToken::new();

        let dyn_backend: Arc<dyn TranslationBackend> = backend.clone();
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            cache.clone(),
            glossary.clone(),
            dyn_backend,
            scheduler,
            token.clone(),
            Arc::new(LogReporter),
        ));

        Self { dir, backend, cache, glossary, token, orchestrator }
    }

    /// Write an SRT file with one cue per text
    pub fn write_srt(&self, name: &str, texts: &[&str]) -> PathBuf {
        let mut content = String::new();
        for (i, text) in texts.iter().enumerate() {
            let start = (i as u64 + 1) * 1000;
            content.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                srt_timestamp(start),
                srt_timestamp(start + 900),
                text
            ));
        }
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write srt");
        path
    }

    /// Write an ASS file with one Dialogue row per text
    pub fn write_ass(&self, name: &str, texts: &[&str]) -> PathBuf {
        let mut content = String::from(
            "[Script Info]\nTitle: Test\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,20\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
        );
        for (i, text) in texts.iter().enumerate() {
            content.push_str(&format!(
                "Dialogue: 0,0:00:{:02}.00,0:00:{:02}.50,Default,,0,0,0,,{}\n",
                i + 1,
                i + 1,
                text
            ));
        }
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write ass");
        path
    }
}

fn srt_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms % 3_600_000) / 60_000,
        (ms % 60_000) / 1_000,
        ms % 1_000
    )
}
