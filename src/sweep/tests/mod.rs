pub mod txbuild;
