//! dcpuasm build script. This script's only responsibility is to generate `shadow_rs` based build information for the
//! binary.

fn main() {
	#[cfg(feature = "binaries")]
	{
		// hide sensitive information
		let denied = std::collections::BTreeSet::from([
			shadow_rs::CARGO_MANIFEST_DIR,
			shadow_rs::COMMIT_EMAIL,
			shadow_rs::CARGO_TREE,
			shadow_rs::CARGO_METADATA,
			shadow_rs::GIT_STATUS_FILE,
		]);

		#[cfg(debug_assertions)]
		const BUILD_PATTERN: shadow_rs::BuildPattern = shadow_rs::BuildPattern::Lazy;
		#[cfg(not(debug_assertions))]
		const BUILD_PATTERN: shadow_rs::BuildPattern = shadow_rs::BuildPattern::RealTime;

		if let Err(why) = shadow_rs::ShadowBuilder::builder().deny_const(denied).build_pattern(BUILD_PATTERN).build() {
			println!("cargo:warning=could not generate build information: {why}");
		}
	}
}
