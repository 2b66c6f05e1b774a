pub mod auth; // Cookieファイル
pub mod continuation;
pub mod innertube;
pub mod metadata; // yt-dlp連携
pub mod replay;
pub mod youtube;
