pub mod diary_repository;
pub mod diary_video_repository;
