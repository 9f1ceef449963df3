mod message;
mod orchestration;
mod provider;
